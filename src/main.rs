use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use piano_feature_store::{load_config, run, Config, StoreReader};

/// Log-mel and piano-roll feature extraction into chunked stores
#[derive(Parser)]
#[command(name = "piano-feature-store")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute features for the whole dataset
    Run(RunArgs),
    /// Print the effective configuration as JSON
    ShowConfig(RunArgs),
    /// Summarize an existing store file
    Inspect {
        /// Store file to read
        file: PathBuf,
    },
}

#[derive(Args)]
struct RunArgs {
    /// JSON configuration file, overridden by the flags below
    #[arg(short, long)]
    config: Option<PathBuf>,
    #[arg(long)]
    input_path: Option<PathBuf>,
    #[arg(long)]
    output_dir: Option<PathBuf>,
    #[arg(long)]
    target_sr: Option<u32>,
    #[arg(long)]
    stft_winsize: Option<usize>,
    #[arg(long)]
    stft_hopsize: Option<usize>,
    #[arg(long)]
    melbins: Option<usize>,
    #[arg(long)]
    mel_fmin: Option<u32>,
    #[arg(long)]
    mel_fmax: Option<u32>,
    /// Do not extend notes while the sustain pedal is down
    #[arg(long)]
    no_sus_extend: bool,
    #[arg(long)]
    chunklen_seconds: Option<f32>,
    /// Only compute piano rolls
    #[arg(long)]
    ignore_mel: bool,
    /// Comma-separated subset of train,validation,test
    #[arg(long, value_delimiter = ',')]
    splits: Option<Vec<String>>,
}

impl RunArgs {
    fn into_config(self) -> anyhow::Result<Config> {
        let mut config = match &self.config {
            Some(path) => load_config(path)?,
            None => Config::default(),
        };
        if let Some(v) = self.input_path {
            config.input_path = v;
        }
        if let Some(v) = self.output_dir {
            config.output_dir = v;
        }
        if let Some(v) = self.target_sr {
            config.target_sr = v;
        }
        if let Some(v) = self.stft_winsize {
            config.stft_winsize = v;
        }
        if let Some(v) = self.stft_hopsize {
            config.stft_hopsize = v;
        }
        if let Some(v) = self.melbins {
            config.melbins = v;
        }
        if let Some(v) = self.mel_fmin {
            config.mel_fmin = v;
        }
        if let Some(v) = self.mel_fmax {
            config.mel_fmax = v;
        }
        if self.no_sus_extend {
            config.midi_sus_extend = false;
        }
        if let Some(v) = self.chunklen_seconds {
            config.chunklen_seconds = v;
        }
        if self.ignore_mel {
            config.ignore_mel = true;
        }
        if let Some(v) = self.splits {
            config.splits = v;
        }
        Ok(config)
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => {
            let config = args.into_config()?;
            log::info!("Configuration:\n{}", serde_json::to_string_pretty(&config)?);
            let summary = run(&config)?;
            println!("{} samples committed, {} skipped", summary.committed, summary.skipped);
        }
        Commands::ShowConfig(args) => {
            let config = args.into_config()?;
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        Commands::Inspect { file } => {
            let reader = StoreReader::open(&file)?;
            let header = reader.header();
            println!("{}", file.display());
            println!("  feature height:   {}", reader.feature_height());
            println!("  samples:          {}", reader.len());
            println!("  total width:      {}", reader.total_width());
            println!("  chunk length:     {}", header.data_chunk_length);
            println!("  compression:      {:?}", header.compression);
            println!("  closed:           {}", reader.is_closed());
            for i in 0..reader.len().min(5) {
                if let (Some(meta), Some(sample)) = (reader.metadata(i), reader.sample(i)) {
                    println!("  [{}] width {} {}", i, sample.ncols(), meta);
                }
            }
        }
    }

    Ok(())
}
