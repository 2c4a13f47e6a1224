//! Device configuration
//!
//! Defaults are consulted once, when a device is constructed. Nothing in
//! the crate reads a global after that.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{Result, ScullError};

pub const DEFAULT_QUANTUM: usize = 4000;
pub const DEFAULT_QSET: usize = 1000;
pub const DEFAULT_PIPE_BUFFER: usize = 4000;
pub const DEFAULT_NR_DEVS: usize = 4;
pub const DEFAULT_NR_PIPE_DEVS: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScullConfig {
    /// Bytes per quantum
    pub quantum: usize,
    /// Quanta per node
    pub qset: usize,
    /// Pipe buffer capacity, one byte of which is reserved
    pub pipe_buffer: usize,
    /// Number of plain store devices
    pub nr_devs: usize,
    /// Number of pipe devices
    pub nr_pipe_devs: usize,
}

impl Default for ScullConfig {
    fn default() -> Self {
        Self {
            quantum: DEFAULT_QUANTUM,
            qset: DEFAULT_QSET,
            pipe_buffer: DEFAULT_PIPE_BUFFER,
            nr_devs: DEFAULT_NR_DEVS,
            nr_pipe_devs: DEFAULT_NR_PIPE_DEVS,
        }
    }
}

impl ScullConfig {
    /// Read a JSON object from `reader` and overlay it on the defaults.
    ///
    /// # Errors
    ///
    /// Returns `ScullError::Config` if:
    /// - reading from `reader` fails
    /// - the input is not a JSON object with known keys
    /// - a value fails [`ScullConfig::validate`]
    pub fn from_reader(mut reader: impl embedded_io::Read) -> Result<Self> {
        let mut buffer = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            match reader.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => buffer.extend_from_slice(&chunk[..n]),
                Err(e) => return Err(ScullError::Config(format!("failed to read config: {e:?}"))),
            }
        }

        let config: ScullConfig = serde_json::from_slice(&buffer)
            .map_err(|e| ScullError::Config(format!("failed to parse config JSON: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Build a config from key/value pairs, as module parameters would arrive.
    ///
    /// # Errors
    ///
    /// Returns `ScullError::Config` for unknown keys, non-integer values, or
    /// values that fail validation.
    pub fn from_map(opts: HashMap<String, serde_json::Value>) -> Result<Self> {
        let object: serde_json::Map<String, serde_json::Value> = opts.into_iter().collect();
        let config: ScullConfig = serde_json::from_value(serde_json::Value::Object(object))
            .map_err(|e| ScullError::Config(format!("bad config value: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    ///
    /// Returns `ScullError::Config` if quantum or qset is zero, or the pipe
    /// buffer cannot hold at least one byte.
    pub fn validate(&self) -> Result<()> {
        if self.quantum == 0 {
            return Err(ScullError::Config("quantum must be positive".into()));
        }
        if self.qset == 0 {
            return Err(ScullError::Config("qset must be positive".into()));
        }
        if self.pipe_buffer < 2 {
            return Err(ScullError::Config("pipe_buffer must be at least 2".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct SliceReader<'a>(&'a [u8]);

    impl embedded_io::ErrorType for SliceReader<'_> {
        type Error = embedded_io::ErrorKind;
    }

    impl embedded_io::Read for SliceReader<'_> {
        fn read(&mut self, buf: &mut [u8]) -> std::result::Result<usize, Self::Error> {
            let n = buf.len().min(self.0.len());
            buf[..n].copy_from_slice(&self.0[..n]);
            self.0 = &self.0[n..];
            Ok(n)
        }
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = ScullConfig::from_reader(SliceReader(br#"{"quantum": 16}"#)).unwrap();
        assert_eq!(config.quantum, 16);
        assert_eq!(config.qset, DEFAULT_QSET);
        assert_eq!(config.pipe_buffer, DEFAULT_PIPE_BUFFER);
    }

    #[test]
    fn test_unknown_key_rejected() {
        let err = ScullConfig::from_reader(SliceReader(br#"{"quantom": 16}"#)).unwrap_err();
        assert!(matches!(err, ScullError::Config(_)));
    }

    #[test]
    fn test_zero_qset_rejected() {
        let mut opts = HashMap::new();
        opts.insert("qset".to_string(), serde_json::json!(0));
        assert!(ScullConfig::from_map(opts).is_err());
    }

    #[test]
    fn test_from_map() {
        let mut opts = HashMap::new();
        opts.insert("pipe_buffer".to_string(), serde_json::json!(4096));
        opts.insert("nr_devs".to_string(), serde_json::json!(2));
        let config = ScullConfig::from_map(opts).unwrap();
        assert_eq!(config.pipe_buffer, 4096);
        assert_eq!(config.nr_devs, 2);
    }
}
