use serde::Deserialize;

use crate::error::Result;

/// Engine configuration.
#[derive(Debug, PartialEq, Deserialize)]
pub struct Config {
    pub log_level: String,

    /// Number of tuples a physical operator yields per batch.
    pub vector_size: usize,

    /// Maximum depth of the ambient execution context stack. Bounds
    /// recursive SQL function invocations.
    pub max_call_depth: usize,
}

impl Config {
    pub fn new(file: &str) -> Result<Config> {
        let mut cfg = config::Config::builder()
            .set_default("log_level", "debug")?
            .set_default("vector_size", 10)?
            .set_default("max_call_depth", 64)?;
        if !file.is_empty() {
            cfg = cfg.add_source(config::File::with_name(file))
        }
        cfg = cfg.add_source(config::Environment::with_prefix("FUNCDB"));
        Ok(cfg.build()?.try_deserialize()?)
    }
}

impl Default for Config {
    fn default() -> Self {
        Config { log_level: "debug".to_string(), vector_size: 10, max_call_depth: 64 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() -> Result<()> {
        let cfg = Config::new("")?;
        assert_eq!(cfg, Config::default());
        Ok(())
    }
}
