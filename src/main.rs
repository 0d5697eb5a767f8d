use anyhow::{Context, Result};
use clap::Parser;
use std::fs;
use std::path::PathBuf;

use egohand_curator::config::Config;
use egohand_curator::dataset::{SampleCurator, Split};

#[derive(Parser, Debug)]
#[command(author, version = env!("GIT_VERSION"), about, long_about = None)]
struct Args {
    /// 設定ファイル
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,

    /// 対象スプリット（設定ファイルより優先）
    #[arg(long, value_enum)]
    split: Option<Split>,

    /// データセットルート（設定ファイルより優先）
    #[arg(long)]
    root: Option<PathBuf>,

    /// インデックスJSONの出力先
    #[arg(long, default_value = "index.json")]
    output: PathBuf,

    /// 先頭N件のサンプルのクロップ画像を書き出す
    #[arg(long, default_value_t = 0)]
    dump_samples: usize,

    /// クロップ画像の出力先
    #[arg(long, default_value = "crops")]
    dump_dir: PathBuf,

    /// ログレベル（RUST_LOG 形式）
    #[arg(long)]
    log_level: Option<String>,
}

fn init_logger(level: &str) {
    let mut builder = env_logger::Builder::new();
    builder.target(env_logger::Target::Stderr);
    builder.filter_level(log::LevelFilter::Info);
    builder.parse_filters(level);

    if let Err(err) = builder.try_init() {
        eprintln!("Failed to initialize logger: {}", err);
    }
}

fn resolve_log_level(args: &Args) -> String {
    if let Some(level) = &args.log_level {
        return level.clone();
    }
    match std::env::var("RUST_LOG") {
        Ok(level) if !level.trim().is_empty() => level,
        _ => "info".to_string(),
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logger(&resolve_log_level(&args));

    let mut config = Config::load_or_default(&args.config);
    if let Some(split) = args.split {
        config.dataset.split = split;
    }
    if let Some(root) = &args.root {
        config.dataset.root = root.clone();
    }

    println!("=== EgoHand Curator ({}) ===", env!("GIT_VERSION"));
    println!("データセット: {}", config.dataset.root.display());
    println!("スプリット: {} ({})", config.dataset.split, config.dataset.anno_type);
    println!();

    let curator = SampleCurator::new(config);
    let index = curator.build_index()?;
    let stats = index.stats();

    println!("take数: {} (スキップ {})", index.takes.len(), index.skipped_takes.len());
    for skip in &index.skipped_takes {
        println!("  スキップ: {} ({})", skip.take.name, skip.reason);
    }
    println!("採用: {}", stats.accepted);
    println!("不採用: {}", stats.skipped());
    println!("  アノテーション欠損: {}", stats.annotation_missing);
    println!("  カメラポーズ欠損: {}", stats.pose_missing);
    println!("  手首欠損: {}", stats.wrist_missing);
    println!("  有効キーポイント不足: {}", stats.insufficient_keypoints);

    index.save(&args.output)?;
    println!("インデックス保存: {}", args.output.display());

    if args.dump_samples > 0 && !index.is_empty() {
        fs::create_dir_all(&args.dump_dir)
            .with_context(|| format!("Failed to create {}", args.dump_dir.display()))?;
        let images = curator.image_store();
        let cfg = &curator.config().curation;
        let n = args.dump_samples.min(index.len());
        for i in 0..n {
            let sample = index.materialize(i, &images, cfg)?;
            let path = args.dump_dir.join(format!(
                "{}_{:06}_{}.png",
                sample.take_name,
                sample.frame_index,
                sample.hand.as_str()
            ));
            sample
                .crop
                .save(&path)
                .with_context(|| format!("Failed to write {}", path.display()))?;
        }
        println!("クロップ画像 {} 件: {}", n, args.dump_dir.display());
    }

    Ok(())
}
