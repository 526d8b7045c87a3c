//! Init command: write a sample configuration file

use std::path::PathBuf;

use crate::cli::error::CliError;
use crate::database::config::{CONFIG_FILENAME, sample_config};

/// Init command arguments
#[derive(Debug, Clone)]
pub struct InitArgs {
    /// Directory the configuration file is written to
    pub dir: PathBuf,
    /// Overwrite an existing file
    pub force: bool,
}

pub fn handle_init(args: &InitArgs) -> Result<(), CliError> {
    let path = args.dir.join(CONFIG_FILENAME);
    if path.exists() && !args.force {
        return Err(CliError::FileExists(path));
    }

    std::fs::create_dir_all(&args.dir)
        .map_err(|e| CliError::FileWriteError(args.dir.clone(), e.to_string()))?;
    std::fs::write(&path, sample_config())
        .map_err(|e| CliError::FileWriteError(path.clone(), e.to_string()))?;

    println!("Wrote {}", path.display());
    Ok(())
}
