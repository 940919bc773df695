//! CSV output for sampling traces in a CmdStan-like layout
//!
//! Each chain is written to its own file with a header row, the sampler
//! statistics as `__` suffixed columns and one column per parameter.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{ensure, Context, Result};

use crate::{ChainOutput, Param, Trace};

/// Configuration for CSV trace output.
///
/// Files are named `chain_{id}.csv` where `{id}` is the chain number starting from 0.
///
/// The columns are:
/// - `lp__`: log density of the draw
/// - `accept_stat__`: acceptance probability of the proposal
/// - `scale__`: proposal scale used for the draw
/// - `accepted__`: 1 if the proposal was accepted, 0 otherwise
/// - one column per parameter
pub struct CsvConfig {
    /// Directory where CSV files will be written
    output_dir: PathBuf,
    /// Number of decimal places for floating point values
    precision: usize,
    /// Whether to store warmup samples (default: true)
    store_warmup: bool,
}

impl CsvConfig {
    /// Create a new CSV configuration.
    ///
    /// # Example
    ///
    /// ```rust
    /// use metropolis_rs::CsvConfig;
    /// let config = CsvConfig::new("mcmc_output").with_precision(4);
    /// ```
    pub fn new<P: AsRef<Path>>(output_dir: P) -> Self {
        Self {
            output_dir: output_dir.as_ref().to_path_buf(),
            precision: 6,
            store_warmup: true,
        }
    }

    /// Set the precision (number of decimal places) for floating point values.
    ///
    /// Default is 6 decimal places.
    pub fn with_precision(mut self, precision: usize) -> Self {
        self.precision = precision;
        self
    }

    /// Configure whether to store warmup samples.
    pub fn store_warmup(mut self, store: bool) -> Self {
        self.store_warmup = store;
        self
    }

    /// Write one file per chain and return their paths.
    pub fn write(&self, trace: &Trace, params: &[Param]) -> Result<Vec<PathBuf>> {
        std::fs::create_dir_all(&self.output_dir).with_context(|| {
            format!("Failed to create output directory: {:?}", self.output_dir)
        })?;
        trace
            .chains
            .iter()
            .map(|chain| self.write_chain(chain, params))
            .collect()
    }

    fn write_chain(&self, chain: &ChainOutput, params: &[Param]) -> Result<PathBuf> {
        ensure!(
            chain.dim() == params.len(),
            "Chain {} has {} parameters but {} names were given",
            chain.chain_id,
            chain.dim(),
            params.len()
        );

        let file_path = self
            .output_dir
            .join(format!("chain_{}.csv", chain.chain_id));
        let file = File::create(&file_path)
            .with_context(|| format!("Failed to create CSV file: {:?}", file_path))?;
        let mut writer = BufWriter::new(file);

        let mut headers = vec![
            "lp__".to_string(),
            "accept_stat__".to_string(),
            "scale__".to_string(),
            "accepted__".to_string(),
        ];
        headers.extend(params.iter().map(|p| p.name.clone()));
        writeln!(writer, "{}", headers.join(","))?;

        let n = chain.num_draws();
        let stat = |name: &str| {
            chain
                .stat_f64(name)
                .with_context(|| format!("Missing sampler stat {}", name))
        };
        let logp = stat("logp")?;
        let accept_prob = stat("accept_prob")?;
        let scale = stat("scale")?;
        let accepted = chain.stat_bool("accepted").context("Missing accepted stat")?;
        let tuning = chain.stat_bool("tuning").context("Missing tuning stat")?;

        for i in 0..n {
            if tuning[i] && !self.store_warmup {
                continue;
            }
            let mut row = vec![
                self.format_f64(logp[i]),
                self.format_f64(accept_prob[i]),
                self.format_f64(scale[i]),
                if accepted[i] { "1" } else { "0" }.to_string(),
            ];
            let draw = chain
                .draw(i)
                .with_context(|| format!("Missing draw {} of chain {}", i, chain.chain_id))?;
            row.extend(draw.iter().map(|&v| self.format_f64(v)));
            writeln!(writer, "{}", row.join(","))?;
        }

        writer.flush().context("Failed to flush CSV file")?;
        Ok(file_path)
    }

    fn format_f64(&self, v: f64) -> String {
        if v.is_nan() {
            "NA".to_string()
        } else if v.is_infinite() {
            if v > 0.0 { "Inf" } else { "-Inf" }.to_string()
        } else {
            format!("{:.prec$}", v, prec = self.precision)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::CsvConfig;
    use crate::{ChainTrace, Param, Progress, Trace};

    use pretty_assertions::assert_eq;

    fn trace() -> Trace {
        let mut chain = ChainTrace::new(0, 2, 3);
        for (draw, tuning) in [(0, true), (1, false), (2, false)] {
            let info = Progress {
                draw,
                chain: 0,
                accepted: draw != 1,
                accept_prob: 0.5,
                tuning,
                scale: 1.25,
                logp: if draw == 2 { f64::NEG_INFINITY } else { -1. },
            };
            chain.append_value(&[draw as f64, 0.5], &info);
        }
        std::iter::once(chain.finalize().unwrap()).into()
    }

    #[test]
    fn writes_chain_files() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let params = [Param::location("mu"), Param::scale("sigma2")];
        let paths = CsvConfig::new(dir.path())
            .with_precision(2)
            .write(&trace(), &params)?;
        assert_eq!(paths.len(), 1);
        assert!(paths[0].ends_with("chain_0.csv"));

        let content = std::fs::read_to_string(&paths[0])?;
        let lines = content.lines().collect::<Vec<_>>();
        assert_eq!(lines[0], "lp__,accept_stat__,scale__,accepted__,mu,sigma2");
        assert_eq!(lines[1], "-1.00,0.50,1.25,1,0.00,0.50");
        assert_eq!(lines[2], "-1.00,0.50,1.25,0,1.00,0.50");
        assert_eq!(lines[3], "-Inf,0.50,1.25,1,2.00,0.50");
        assert_eq!(lines.len(), 4);
        Ok(())
    }

    #[test]
    fn skips_warmup() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let params = [Param::location("mu"), Param::scale("sigma2")];
        let paths = CsvConfig::new(dir.path())
            .store_warmup(false)
            .write(&trace(), &params)?;
        let content = std::fs::read_to_string(&paths[0])?;
        assert_eq!(content.lines().count(), 3);
        Ok(())
    }

    #[test]
    fn rejects_wrong_names() {
        let dir = tempfile::tempdir().unwrap();
        let params = [Param::location("mu")];
        assert!(CsvConfig::new(dir.path()).write(&trace(), &params).is_err());
    }
}
