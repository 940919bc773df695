use std::sync::Arc;

use anyhow::{Context, Result};
use arrow::{
    array::{
        Array, ArrayBuilder, ArrayRef, AsArray, BooleanBuilder, FixedSizeListBuilder,
        Float64Builder, PrimitiveBuilder, StructArray, UInt64Builder,
    },
    datatypes::{DataType, Field, Fields, Float64Type, UInt64Type},
};
use itertools::Itertools;

use crate::Progress;

/// Collects the draws and sampler statistics of one chain
pub struct ChainTrace {
    chain_id: u64,
    draws: FixedSizeListBuilder<PrimitiveBuilder<Float64Type>>,
    draw: UInt64Builder,
    logp: Float64Builder,
    accepted: BooleanBuilder,
    accept_prob: Float64Builder,
    scale: Float64Builder,
    tuning: BooleanBuilder,
}

fn stats_fields() -> Fields {
    Fields::from(vec![
        Field::new("draw", DataType::UInt64, false),
        Field::new("logp", DataType::Float64, false),
        Field::new("accepted", DataType::Boolean, false),
        Field::new("accept_prob", DataType::Float64, false),
        Field::new("scale", DataType::Float64, false),
        Field::new("tuning", DataType::Boolean, false),
    ])
}

impl ChainTrace {
    pub fn new(chain_id: u64, dim: usize, capacity: usize) -> Self {
        let values = PrimitiveBuilder::with_capacity(capacity * dim);
        let draws = FixedSizeListBuilder::with_capacity(values, dim as i32, capacity);
        ChainTrace {
            chain_id,
            draws,
            draw: UInt64Builder::with_capacity(capacity),
            logp: Float64Builder::with_capacity(capacity),
            accepted: BooleanBuilder::with_capacity(capacity),
            accept_prob: Float64Builder::with_capacity(capacity),
            scale: Float64Builder::with_capacity(capacity),
            tuning: BooleanBuilder::with_capacity(capacity),
        }
    }

    pub fn append_value(&mut self, point: &[f64], info: &Progress) {
        self.draws.values().append_slice(point);
        self.draws.append(true);
        self.draw.append_value(info.draw);
        self.logp.append_value(info.logp);
        self.accepted.append_value(info.accepted);
        self.accept_prob.append_value(info.accept_prob);
        self.scale.append_value(info.scale);
        self.tuning.append_value(info.tuning);
    }

    pub fn len(&self) -> usize {
        self.draws.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the draws so far, without consuming the builders.
    pub fn inspect(&self) -> Result<ChainOutput> {
        let columns: Vec<ArrayRef> = vec![
            Arc::new(self.draw.finish_cloned()) as ArrayRef,
            Arc::new(self.logp.finish_cloned()) as ArrayRef,
            Arc::new(self.accepted.finish_cloned()) as ArrayRef,
            Arc::new(self.accept_prob.finish_cloned()) as ArrayRef,
            Arc::new(self.scale.finish_cloned()) as ArrayRef,
            Arc::new(self.tuning.finish_cloned()) as ArrayRef,
        ];
        Ok(ChainOutput {
            chain_id: self.chain_id,
            draws: ArrayBuilder::finish_cloned(&self.draws),
            stats: stats_array(columns)?,
        })
    }

    pub fn finalize(mut self) -> Result<ChainOutput> {
        let columns: Vec<ArrayRef> = vec![
            Arc::new(self.draw.finish()) as ArrayRef,
            Arc::new(self.logp.finish()) as ArrayRef,
            Arc::new(self.accepted.finish()) as ArrayRef,
            Arc::new(self.accept_prob.finish()) as ArrayRef,
            Arc::new(self.scale.finish()) as ArrayRef,
            Arc::new(self.tuning.finish()) as ArrayRef,
        ];
        Ok(ChainOutput {
            chain_id: self.chain_id,
            draws: ArrayBuilder::finish(&mut self.draws),
            stats: stats_array(columns)?,
        })
    }
}

fn stats_array(columns: Vec<ArrayRef>) -> Result<ArrayRef> {
    let stats = StructArray::try_new(stats_fields(), columns, None)
        .context("Could not assemble sampler stats")?;
    Ok(Arc::new(stats))
}

/// The draws and sampler statistics of a single chain
#[derive(Debug, Clone)]
pub struct ChainOutput {
    /// Fixed size list array with one entry of length `dim` per draw
    pub draws: ArrayRef,
    /// Struct array with the columns `draw`, `logp`, `accepted`,
    /// `accept_prob`, `scale` and `tuning`
    pub stats: ArrayRef,
    pub chain_id: u64,
}

impl ChainOutput {
    pub fn num_draws(&self) -> usize {
        self.draws.len()
    }

    pub fn dim(&self) -> usize {
        self.draws.as_fixed_size_list().value_length() as usize
    }

    /// All draws of the chain, flattened in draw major order.
    pub fn flat_values(&self) -> &[f64] {
        self.draws
            .as_fixed_size_list()
            .values()
            .as_primitive::<Float64Type>()
            .values()
    }

    /// The position of draw `index`, or `None` if there is no such draw.
    pub fn draw(&self, index: usize) -> Option<&[f64]> {
        if index >= self.num_draws() {
            return None;
        }
        let dim = self.dim();
        self.flat_values().get(index * dim..(index + 1) * dim)
    }

    /// All draws of a single parameter.
    pub fn param_values(&self, param: usize) -> Vec<f64> {
        self.flat_values()
            .iter()
            .skip(param)
            .step_by(self.dim().max(1))
            .copied()
            .collect_vec()
    }

    fn stats_column(&self, name: &str) -> Option<&ArrayRef> {
        self.stats.as_struct().column_by_name(name)
    }

    /// A floating point sampler statistic (`logp`, `accept_prob` or `scale`).
    pub fn stat_f64(&self, name: &str) -> Option<Vec<f64>> {
        let column = self.stats_column(name)?.as_primitive_opt::<Float64Type>()?;
        Some(column.values().to_vec())
    }

    /// A boolean sampler statistic (`accepted` or `tuning`).
    pub fn stat_bool(&self, name: &str) -> Option<Vec<bool>> {
        let column = self.stats_column(name)?.as_boolean_opt()?;
        Some(column.values().iter().collect_vec())
    }

    pub fn draw_index(&self) -> Option<Vec<u64>> {
        let column = self.stats_column("draw")?.as_primitive_opt::<UInt64Type>()?;
        Some(column.values().to_vec())
    }

    /// Fraction of accepted proposals, optionally including tuning draws.
    pub fn acceptance_rate(&self, include_tuning: bool) -> f64 {
        let (Some(accepted), Some(tuning)) = (self.stat_bool("accepted"), self.stat_bool("tuning"))
        else {
            return 0.;
        };
        let (count, total) = accepted
            .iter()
            .zip(tuning.iter())
            .filter(|&(_, &tuning)| include_tuning || !tuning)
            .fold((0usize, 0usize), |(count, total), (&accepted, _)| {
                (count + accepted as usize, total + 1)
            });
        if total == 0 {
            return 0.;
        }
        count as f64 / total as f64
    }
}

/// The output of all chains, sorted by chain id
#[derive(Debug, Clone)]
pub struct Trace {
    pub chains: Vec<ChainOutput>,
}

impl<I: Iterator<Item = ChainOutput>> From<I> for Trace {
    fn from(value: I) -> Self {
        let mut chains = value.into_iter().collect_vec();
        chains.sort_unstable_by_key(|x| x.chain_id);
        Trace { chains }
    }
}

impl Trace {
    /// Post-tuning draws of one parameter across all chains.
    pub fn posterior_values(&self, param: usize) -> Vec<f64> {
        self.chains
            .iter()
            .flat_map(|chain| {
                let tuning = chain.stat_bool("tuning").unwrap_or_default();
                chain
                    .param_values(param)
                    .into_iter()
                    .zip(tuning.into_iter().chain(std::iter::repeat(false)))
                    .filter(|(_, tuning)| !tuning)
                    .map(|(value, _)| value)
                    .collect_vec()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::{ChainTrace, Trace};
    use crate::Progress;

    use pretty_assertions::assert_eq;

    fn progress(draw: u64, accepted: bool, tuning: bool) -> Progress {
        Progress {
            draw,
            chain: 0,
            accepted,
            accept_prob: if accepted { 1. } else { 0.25 },
            tuning,
            scale: 0.5,
            logp: -(draw as f64),
        }
    }

    #[test]
    fn collects_draws_and_stats() {
        let mut trace = ChainTrace::new(3, 2, 4);
        assert!(trace.is_empty());
        trace.append_value(&[1., 10.], &progress(0, true, true));
        trace.append_value(&[2., 20.], &progress(1, false, true));
        trace.append_value(&[3., 30.], &progress(2, true, false));
        trace.append_value(&[4., 40.], &progress(3, false, false));
        assert_eq!(trace.len(), 4);

        let snapshot = trace.inspect().unwrap();
        assert_eq!(snapshot.num_draws(), 4);

        let output = trace.finalize().unwrap();
        assert_eq!(output.chain_id, 3);
        assert_eq!(output.dim(), 2);
        assert_eq!(output.draw(2), Some(&[3., 30.][..]));
        assert_eq!(output.draw(4), None);
        assert_eq!(output.param_values(1), vec![10., 20., 30., 40.]);
        assert_eq!(output.draw_index().unwrap(), vec![0, 1, 2, 3]);
        assert_eq!(output.stat_f64("logp").unwrap(), vec![0., -1., -2., -3.]);
        assert_eq!(
            output.stat_bool("tuning").unwrap(),
            vec![true, true, false, false]
        );
        assert_eq!(output.acceptance_rate(true), 0.5);
        assert_eq!(output.acceptance_rate(false), 0.5);
        assert_eq!(output.stat_f64("missing"), None);
    }

    #[test]
    fn trace_sorts_chains() {
        let outputs = [2u64, 0, 1].into_iter().map(|id| {
            let mut trace = ChainTrace::new(id, 1, 1);
            trace.append_value(&[id as f64], &progress(0, true, false));
            trace.finalize().unwrap()
        });
        let trace: Trace = outputs.into();
        let ids = trace.chains.iter().map(|c| c.chain_id).collect::<Vec<_>>();
        assert_eq!(ids, vec![0, 1, 2]);
        assert_eq!(trace.posterior_values(0), vec![0., 1., 2.]);
    }
}
