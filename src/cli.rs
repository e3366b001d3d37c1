use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Args as ClapArgs, Parser, Subcommand};

use crate::app::MatchParams;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

/// Selection overrides shared by every matching command.
#[derive(ClapArgs, Debug, Clone, Default)]
pub struct MatchOpts {
    /// Reference database CSV (defaults to `database_path` from config)
    #[clap(short, long)]
    pub database: Option<PathBuf>,

    /// Minimum cosine similarity, between -1.0 and 1.0
    #[clap(long, allow_negative_numbers = true)]
    pub threshold: Option<f32>,

    /// Maximum number of matches per text
    #[clap(long)]
    pub top_k: Option<usize>,

    /// Prefix prepended to each text before embedding
    #[clap(long)]
    pub prefix: Option<String>,
}

impl MatchOpts {
    pub fn params(&self) -> MatchParams {
        MatchParams {
            threshold: self.threshold,
            top_k: self.top_k,
            prefix: self.prefix.clone(),
        }
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Attach closest reference propositions to every extracted proposition
    Match {
        /// Proposition JSON file, `-` for stdin
        #[clap(short, long)]
        input: PathBuf,

        /// Annotated JSON output, `-` for stdout
        #[clap(short, long, default_value = "-")]
        output: PathBuf,

        #[command(flatten)]
        opts: MatchOpts,
    },

    /// Match claims (`[{"sourceText": ...}]`) against the reference database
    Claims {
        /// Claims JSON file, `-` for stdin
        #[clap(short, long)]
        claims: PathBuf,

        /// Claim matches JSON output, `-` for stdout
        #[clap(short, long, default_value = "-")]
        output: PathBuf,

        #[command(flatten)]
        opts: MatchOpts,
    },

    /// Print the closest reference propositions for one text
    Query {
        text: String,

        #[command(flatten)]
        opts: MatchOpts,
    },

    /// Embed a CSV of source propositions into a reference database
    EmbedDb {
        /// CSV with `text` (or `cleanText`) and optional `id`, `file_name`
        #[clap(short, long)]
        input: PathBuf,

        /// Reference database CSV to write
        #[clap(short, long)]
        output: PathBuf,

        /// Texts per embedding batch (defaults to config)
        #[clap(long)]
        batch_size: Option<usize>,

        /// Prefix for stored texts (defaults to config)
        #[clap(long)]
        prefix: Option<String>,
    },

    /// Render claim matches as a Markdown report
    Report {
        /// Claim matches JSON produced by `claims`, `-` for stdin
        #[clap(short, long)]
        claims: PathBuf,

        /// Markdown output, `-` for stdout
        #[clap(short, long, default_value = "-")]
        output: PathBuf,

        /// Report heading
        #[clap(long, default_value = "Claim support report")]
        title: String,
    },

    /// Start the HTTP daemon
    Serve {
        /// Listen address (defaults to `listen_addr` from config)
        #[clap(long)]
        addr: Option<String>,

        /// Reference database CSV (defaults to `database_path` from config)
        #[clap(short, long)]
        database: Option<PathBuf>,
    },
}

fn is_std_stream(path: &Path) -> bool {
    path.as_os_str() == "-"
}

/// Read a whole file, or stdin when `path` is `-`.
pub fn read_input(path: &Path) -> anyhow::Result<String> {
    if is_std_stream(path) {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read stdin")?;
        return Ok(buf);
    }

    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

/// Write `content` to a file, or stdout when `path` is `-`.
pub fn write_output(path: &Path, content: &str) -> anyhow::Result<()> {
    if is_std_stream(path) {
        let mut stdout = std::io::stdout().lock();
        stdout.write_all(content.as_bytes())?;
        if !content.ends_with('\n') {
            stdout.write_all(b"\n")?;
        }
        return Ok(());
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    std::fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))?;
    log::info!("Wrote {}", path.display());

    Ok(())
}
