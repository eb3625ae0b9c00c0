//! Shared test utilities for the hekyll test suite.
//!
//! Provides a source-tree builder and fake converters that stand in for the
//! real Liquid converter.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let src = SourceTree::new()
//!     .file("index.html", "{{ page.title }}")
//!     .bytes("logo.png", &[0x89, b'P', b'N', b'G', 0])
//!     .build();
//!
//! let report = run(Operation::Templates, &settings, &FailingConverter)?;
//! ```

use std::fs;
use std::path::PathBuf;
use std::sync::{Barrier, Mutex};
use std::thread;
use std::time::Duration;
use tempfile::TempDir;

use crate::convert::{ConvertError, ConvertOptions, TemplateConverter};

// =========================================================================
// Fixture setup
// =========================================================================

enum Entry {
    File(PathBuf, Vec<u8>),
    Dir(PathBuf),
}

/// Builds a throwaway source tree in a temp directory.
#[derive(Default)]
pub struct SourceTree {
    entries: Vec<Entry>,
}

impl SourceTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn file(self, path: &str, text: &str) -> Self {
        self.bytes(path, text.as_bytes())
    }

    pub fn bytes(mut self, path: &str, bytes: &[u8]) -> Self {
        self.entries.push(Entry::File(path.into(), bytes.to_vec()));
        self
    }

    pub fn dir(mut self, path: &str) -> Self {
        self.entries.push(Entry::Dir(path.into()));
        self
    }

    pub fn build(self) -> TempDir {
        let tmp = TempDir::new().unwrap();
        for entry in self.entries {
            match entry {
                Entry::File(path, bytes) => {
                    let path = tmp.path().join(path);
                    fs::create_dir_all(path.parent().unwrap()).unwrap();
                    fs::write(path, bytes).unwrap();
                }
                Entry::Dir(path) => fs::create_dir_all(tmp.path().join(path)).unwrap(),
            }
        }
        tmp
    }
}

// =========================================================================
// Fake converters
// =========================================================================

/// Returns its input unchanged.
pub struct EchoConverter;

impl TemplateConverter for EchoConverter {
    fn convert(&self, text: &str, _: &ConvertOptions) -> Result<String, ConvertError> {
        Ok(text.to_string())
    }
}

/// Uppercases its input, so tests can see whether conversion ran.
pub struct UppercaseConverter;

impl TemplateConverter for UppercaseConverter {
    fn convert(&self, text: &str, _: &ConvertOptions) -> Result<String, ConvertError> {
        Ok(text.to_uppercase())
    }
}

/// Appends the options it was called with: `text[prefix=@ yfm=false]`.
pub struct OptionsConverter;

impl TemplateConverter for OptionsConverter {
    fn convert(&self, text: &str, options: &ConvertOptions) -> Result<String, ConvertError> {
        Ok(format!("{text}[prefix={} yfm={}]", options.prefix, options.yfm))
    }
}

/// Fails on any input containing `FAIL`, echoes everything else.
pub struct FailingConverter;

impl TemplateConverter for FailingConverter {
    fn convert(&self, text: &str, _: &ConvertOptions) -> Result<String, ConvertError> {
        if text.contains("FAIL") {
            Err(ConvertError::Other("marker found".to_string()))
        } else {
            Ok(text.to_string())
        }
    }
}

/// Echoes its input and records every call.
#[derive(Default)]
pub struct RecordingConverter {
    pub calls: Mutex<Vec<String>>,
}

impl RecordingConverter {
    pub fn calls(&self) -> Vec<String> {
        let mut calls = self.calls.lock().unwrap().clone();
        calls.sort();
        calls
    }
}

impl TemplateConverter for RecordingConverter {
    fn convert(&self, text: &str, _: &ConvertOptions) -> Result<String, ConvertError> {
        self.calls.lock().unwrap().push(text.to_string());
        Ok(text.to_string())
    }
}

/// Holds `SLOW` and `FAIL` inputs at a barrier until both are in flight.
/// `FAIL` then fails at once; `SLOW` waits `linger` before echoing, so it is
/// still converting when the failure is recorded.
pub struct BarrierConverter {
    barrier: Barrier,
    linger: Duration,
}

impl BarrierConverter {
    pub fn new(linger: Duration) -> Self {
        Self {
            barrier: Barrier::new(2),
            linger,
        }
    }
}

impl TemplateConverter for BarrierConverter {
    fn convert(&self, text: &str, _: &ConvertOptions) -> Result<String, ConvertError> {
        if text.contains("FAIL") {
            self.barrier.wait();
            return Err(ConvertError::Other("marker found".to_string()));
        }
        if text.contains("SLOW") {
            self.barrier.wait();
            thread::sleep(self.linger);
        }
        Ok(text.to_string())
    }
}
