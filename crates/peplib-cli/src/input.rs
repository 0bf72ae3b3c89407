use std::path::PathBuf;

use anyhow::{ensure, Context};
use clap::ArgMatches;
use peplib_core::database::{Builder, Parameters};
use serde::{Deserialize, Serialize};

#[derive(Serialize)]
/// Actual run settings - may include overrides or default values not set by user
pub struct Settings {
    pub version: String,
    pub database: Builder,
    pub fasta_paths: Vec<String>,
    pub database_path: PathBuf,

    #[serde(skip_serializing)]
    pub parameters: Parameters,

    #[serde(skip_serializing)]
    pub write_tsv: bool,
}

#[derive(Deserialize, Default)]
/// Input parameters deserialized from JSON file
pub struct Input {
    #[serde(default)]
    pub database: Builder,
    pub fasta_paths: Option<Vec<String>>,
    pub database_path: Option<String>,
    pub write_tsv: Option<bool>,
}

impl Input {
    pub fn from_arguments(matches: ArgMatches) -> anyhow::Result<Self> {
        let path = matches
            .get_one::<String>("parameters")
            .context("a parameter file is required")?;
        let mut input =
            Input::load(path).with_context(|| format!("Failed to read parameters from `{path}`"))?;

        // Handle JSON configuration overrides
        if let Some(output) = matches.get_one::<String>("output") {
            log::trace!("overriding `database_path` parameter.");
            input.database_path = Some(output.into());
        }
        if let Some(fasta_paths) = matches.get_many::<String>("fasta_paths") {
            log::trace!("overriding `fasta_paths` parameter.");
            input.fasta_paths = Some(fasta_paths.into_iter().map(|p| p.into()).collect());
        }
        if let Some(workers) = matches.get_one::<u16>("workers").copied() {
            log::trace!("overriding `database.worker_count` parameter.");
            input.database.worker_count = Some(workers as usize);
        }
        if matches.get_flag("write-tsv") {
            input.write_tsv = Some(true);
        }

        ensure!(
            input.fasta_paths.as_ref().map_or(false, |p| !p.is_empty()),
            "`fasta_paths` must be set. For more information try '--help'"
        );

        Ok(input)
    }

    pub fn load<S: AsRef<str>>(path: S) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        serde_json::from_str(&contents).map_err(anyhow::Error::from)
    }

    pub fn build(mut self) -> anyhow::Result<Settings> {
        self.database.worker_count.get_or_insert_with(num_cpus::get);

        let parameters = self
            .database
            .clone()
            .make_parameters()
            .context("Invalid database parameters")?;

        let fasta_paths = self.fasta_paths.unwrap_or_default();
        ensure!(!fasta_paths.is_empty(), "`fasta_paths` must not be empty");

        let database_path = match self.database_path {
            Some(path) => PathBuf::from(path),
            None => std::env::current_dir()?.join("database"),
        };

        Ok(Settings {
            version: clap::crate_version!().into(),
            database: self.database,
            fasta_paths,
            database_path,
            parameters,
            write_tsv: self.write_tsv.unwrap_or(false),
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parse_input() {
        let input: Input = serde_json::from_str(
            r#"{
                "database": {
                    "protease": "trypsin",
                    "missed_cleavages": 1,
                    "mods_variable_terminal_prot": []
                },
                "fasta_paths": ["a.fasta", "b.fasta"],
                "database_path": "out"
            }"#,
        )
        .unwrap();
        let settings = input.build().unwrap();
        assert_eq!(settings.fasta_paths.len(), 2);
        assert_eq!(settings.database_path, PathBuf::from("out"));
        assert_eq!(settings.parameters.enzyme.missed_cleavages, 1);
        assert!(settings.parameters.protein_mods.variable_terminal.is_empty());
        assert!(settings.parameters.worker_count >= 1);
        assert!(!settings.write_tsv);
    }

    #[test]
    fn reject_bad_input() {
        let no_fasta: Input = serde_json::from_str(r#"{"database": {}}"#).unwrap();
        assert!(no_fasta.build().is_err());

        let bad_mod: Input = serde_json::from_str(
            r#"{"database": {"mods_fixed_terminal": ["x"]}, "fasta_paths": ["a.fasta"]}"#,
        )
        .unwrap();
        assert!(bad_mod.build().is_err());
    }
}
