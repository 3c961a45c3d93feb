use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use dicom_viewports::{
    Result, Scene, SceneConfig, SoftwareRenderer,
    enums::SortBy,
    volume_loader::DicomDirectoryProvider,
};

#[derive(Parser)]
#[command(name = "dicom-viewports", about = "Render a synchronized MPR scene of one DICOM series")]
#[command(version)]
struct Cli {
    /// Directory holding the series' .dcm files
    #[arg(short, long, default_value = "dicom")]
    archive: PathBuf,

    /// Study Instance UID, defaults to the reference study
    #[arg(long)]
    study: Option<String>,

    /// Series Instance UID, defaults to the reference series
    #[arg(long)]
    series: Option<String>,

    /// Directory the rendered frames are written to
    #[arg(short, long, default_value = ".")]
    out: PathBuf,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if cli.verbose { "debug" } else { "info" })
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut config = SceneConfig {
        archive_root: cli.archive.display().to_string(),
        ..SceneConfig::default()
    };
    if let Some(study) = cli.study {
        config.study_instance_uid = study;
    }
    if let Some(series) = cli.series {
        config.series_instance_uid = series;
    }

    let renderer = Arc::new(SoftwareRenderer::new());
    let provider = Arc::new(DicomDirectoryProvider::new(SortBy::ImagePositionPatient));
    let mut scene = Scene::new(provider, renderer.clone());
    scene.setup(&config).await?;

    for viewport_id in scene.viewports().ids() {
        let path = cli.out.join(format!("{viewport_id}.png"));
        renderer.save_frame(&viewport_id, &path)?;
        info!(viewport_id = %viewport_id, path = %path.display(), "Frame written");
    }

    scene.teardown()
}
