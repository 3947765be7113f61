use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use graph_upsert::LoaderConfig;

/// Bulk, idempotent TSV loads into Neo4j.
#[derive(Debug, Parser)]
#[command(name = "graph-upsert", version, about)]
pub struct Cli {
    #[command(flatten)]
    pub connection: ConnectionArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// Overrides for the environment-loaded [`LoaderConfig`].
#[derive(Debug, Default, Args)]
pub struct ConnectionArgs {
    /// Bolt URI. Env: `NEO4J_URI`.
    #[arg(long, global = true)]
    pub uri: Option<String>,

    #[arg(long, global = true)]
    pub user: Option<String>,

    #[arg(long, global = true)]
    pub password: Option<String>,

    #[arg(long, global = true)]
    pub database: Option<String>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Load every `*.tsv` file of a directory: nodes first, then relationships.
    Load(LoadArgs),
    /// Delete every node and relationship.
    Wipe {
        /// Nodes deleted per transaction.
        #[arg(long)]
        batch_size: Option<usize>,
    },
    /// Delete one node and everything connected to it.
    WipeSubgraph {
        #[arg(long)]
        label: String,
        #[arg(long)]
        prop: String,
        #[arg(long)]
        value: String,
        /// Nodes deleted per transaction.
        #[arg(long)]
        batch_size: Option<usize>,
    },
    /// Check connectivity and exit.
    Ping,
}

#[derive(Debug, Args)]
pub struct LoadArgs {
    /// Directory holding the `.tsv` files.
    #[arg(long, env = "DATA_DIR")]
    pub data_dir: PathBuf,

    /// MDF model YAML.
    #[arg(long, env = "MODEL_FILE")]
    pub model_file: PathBuf,

    /// MDF properties YAML.
    #[arg(long, env = "PROPS_FILE")]
    pub props_file: Option<PathBuf>,

    /// Identifying property. Env: `ID_FIELD`, default `guid`.
    #[arg(long)]
    pub id_field: Option<String>,

    /// Column dropped from every record. Env: `SUBGRAPH_COL`.
    #[arg(long)]
    pub subgraph_col: Option<String>,

    #[arg(long)]
    pub chunk_size: Option<usize>,

    /// Attempts per relationship batch.
    #[arg(long)]
    pub max_retries: Option<u32>,

    /// Load into an in-memory graph instead of Neo4j.
    #[arg(long)]
    pub dry_run: bool,
}

impl Cli {
    /// Fold command-line overrides into `config`.
    pub fn apply(&self, config: &mut LoaderConfig) {
        let c = &self.connection;
        override_with(&mut config.neo4j_uri, &c.uri);
        override_opt(&mut config.neo4j_user, &c.user);
        override_opt(&mut config.neo4j_password, &c.password);
        override_opt(&mut config.neo4j_database, &c.database);

        match &self.command {
            Command::Load(args) => {
                override_with(&mut config.id_field, &args.id_field);
                override_opt(&mut config.subgraph_col, &args.subgraph_col);
                override_with(&mut config.chunk_size, &args.chunk_size);
                override_with(&mut config.max_retries, &args.max_retries);
            }
            Command::Wipe { batch_size } => {
                override_with(&mut config.wipe_batch_size, batch_size);
            }
            Command::WipeSubgraph { batch_size, .. } => {
                override_with(&mut config.subgraph_batch_size, batch_size);
            }
            Command::Ping => {}
        }
    }
}

fn override_with<T: Clone>(target: &mut T, value: &Option<T>) {
    if let Some(v) = value {
        *target = v.clone();
    }
}

fn override_opt<T: Clone>(target: &mut Option<T>, value: &Option<T>) {
    if value.is_some() {
        *target = value.clone();
    }
}

/// Every `*.tsv` file directly inside `dir`, sorted by file name.
///
/// # Errors
/// Returns an error if `dir` is not a readable directory.
pub async fn discover_tsv_files(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let meta = tokio::fs::metadata(dir)
        .await
        .map_err(|e| anyhow::anyhow!("Cannot access data directory '{}': {}", dir.display(), e))?;
    if !meta.is_dir() {
        anyhow::bail!("Data path is not a directory: {}", dir.display());
    }

    let mut files = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let is_tsv = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("tsv"));
        if is_tsv && entry.file_type().await?.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_discovers_only_tsv_files_sorted() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.tsv", "a.tsv", "notes.txt", "C.TSV"] {
            std::fs::write(dir.path().join(name), "type\tguid\n").unwrap();
        }
        std::fs::create_dir(dir.path().join("nested.tsv")).unwrap();

        let files = discover_tsv_files(dir.path()).await.unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["C.TSV", "a.tsv", "b.tsv"]);
    }

    #[tokio::test]
    async fn test_missing_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(discover_tsv_files(&dir.path().join("absent")).await.is_err());
    }

    #[tokio::test]
    async fn test_file_is_not_a_directory() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.tsv");
        std::fs::write(&file, "").unwrap();
        assert!(discover_tsv_files(&file).await.is_err());
    }

    #[test]
    fn test_flags_override_config() {
        let cli = Cli::parse_from([
            "graph-upsert",
            "--uri",
            "bolt://db:7687",
            "load",
            "--data-dir",
            "/data",
            "--model-file",
            "model.yml",
            "--chunk-size",
            "100",
            "--id-field",
            "id",
        ]);
        let mut config = LoaderConfig::default();
        cli.apply(&mut config);
        assert_eq!(config.neo4j_uri, "bolt://db:7687");
        assert_eq!(config.chunk_size, 100);
        assert_eq!(config.id_field, "id");
        assert_eq!(config.max_retries, 3);
        assert!(matches!(cli.command, Command::Load(LoadArgs { dry_run: false, .. })));
    }

    #[test]
    fn test_wipe_subgraph_args() {
        let cli = Cli::parse_from([
            "graph-upsert",
            "wipe-subgraph",
            "--label",
            "study",
            "--prop",
            "guid",
            "--value",
            "st1",
            "--batch-size",
            "10",
        ]);
        let mut config = LoaderConfig::default();
        cli.apply(&mut config);
        assert_eq!(config.subgraph_batch_size, 10);
        assert_eq!(config.wipe_batch_size, 10_000);
    }
}
