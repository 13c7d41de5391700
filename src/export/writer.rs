//! Copyright © 2025-2026 Wenze Wei. All Rights Reserved.
//!
//! This file is part of Zi.
//! The Zi project belongs to the Dunimd project team.
//!
//! Licensed under the Apache License, Version 2.0 (the "License");
//! You may not use this file except in compliance with the License.
//! You may obtain a copy of the License at
//!
//!     http://www.apache.org/licenses/LICENSE-2.0
//!
//! Unless required by applicable law or agreed to in writing, software
//! distributed under the License is distributed on an "AS IS" BASIS,
//! WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
//! See the License for the specific language governing permissions and
//! limitations under the License.

//! Materializes an output set on disk.
//!
//! Everything is staged next to the destination under a hidden name and moved
//! into place with a single rename, so a failed run leaves nothing visible.

use std::fs;
#[cfg(feature = "zip")]
use std::io::Write;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::{Result, ZiError};
use crate::export::ZiOutputSet;

/// Output format for generated modules.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZiOutputFormat {
    #[default]
    Directory,
    #[cfg(feature = "zip")]
    Zip,
}

#[derive(Clone, Debug)]
pub struct ZiModuleWriter {
    module: String,
    format: ZiOutputFormat,
}

impl ZiModuleWriter {
    pub fn new(module: &str) -> Self {
        Self {
            module: module.to_string(),
            format: ZiOutputFormat::Directory,
        }
    }

    pub fn with_format(mut self, format: ZiOutputFormat) -> Self {
        self.format = format;
        self
    }

    /// Writes `output` under `destination` and returns the final path:
    /// `<destination>/<module>` or `<destination>/<module>.zip`.
    pub fn write(&self, output: &ZiOutputSet, destination: &Path) -> Result<PathBuf> {
        for path in output.paths() {
            check_relative(path)?;
        }
        fs::create_dir_all(destination)?;
        let target = match self.format {
            ZiOutputFormat::Directory => self.write_directory(output, destination)?,
            #[cfg(feature = "zip")]
            ZiOutputFormat::Zip => self.write_zip(output, destination)?,
        };
        log::info!(
            "export.writer.done: module written - path={}, files={}, bytes={}",
            target.display(),
            output.len(),
            output.total_bytes()
        );
        Ok(target)
    }

    fn write_directory(&self, output: &ZiOutputSet, destination: &Path) -> Result<PathBuf> {
        let target = destination.join(&self.module);
        let staging = destination.join(format!(".{}.tmp", self.module));
        if staging.exists() {
            fs::remove_dir_all(&staging)?;
        }

        let staged = (|| -> Result<()> {
            fs::create_dir_all(&staging)?;
            for (path, content) in output.iter() {
                let file = staging.join(path);
                if let Some(parent) = file.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::write(&file, content)?;
            }
            Ok(())
        })();
        if let Err(err) = staged {
            let _ = fs::remove_dir_all(&staging);
            return Err(err);
        }

        // an existing module is swapped out, not merged
        let previous = destination.join(format!(".{}.old", self.module));
        if target.exists() {
            if previous.exists() {
                fs::remove_dir_all(&previous)?;
            }
            fs::rename(&target, &previous)?;
        }
        fs::rename(&staging, &target)?;
        if previous.exists() {
            fs::remove_dir_all(&previous)?;
        }
        Ok(target)
    }

    #[cfg(feature = "zip")]
    fn write_zip(&self, output: &ZiOutputSet, destination: &Path) -> Result<PathBuf> {
        let target = destination.join(format!("{}.zip", self.module));
        let staging = destination.join(format!(".{}.zip.tmp", self.module));

        let staged = (|| -> Result<()> {
            let file = fs::File::create(&staging)?;
            let mut zip = zip::ZipWriter::new(file);
            // fixed timestamps keep archives byte-identical across runs
            let options = zip::write::FileOptions::default()
                .compression_method(zip::CompressionMethod::Deflated)
                .last_modified_time(zip::DateTime::default());
            for (path, content) in output.iter() {
                zip.start_file(format!("{}/{}", self.module, path), options)?;
                zip.write_all(content)?;
            }
            zip.finish()?;
            Ok(())
        })();
        if let Err(err) = staged {
            let _ = fs::remove_file(&staging);
            return Err(err);
        }

        fs::rename(&staging, &target)?;
        Ok(target)
    }
}

fn check_relative(path: &str) -> Result<()> {
    let safe = !path.is_empty()
        && Path::new(path)
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
    if safe {
        Ok(())
    } else {
        Err(ZiError::validation(format!("output path '{}' escapes the module directory", path)))
    }
}
