use fern::colors::{Color, ColoredLevelConfig};
use log::LevelFilter;

/// Initialize human-readable logging to stderr at `level`.
///
/// Lines carry a local timestamp, the colored level and the emitting
/// module. Third-party HTTP crates are capped at `warn` so request-level
/// chatter does not drown the sync log.
pub fn init_logging(level: LevelFilter) -> anyhow::Result<()> {
	let colors = ColoredLevelConfig::new()
		.error(Color::Red)
		.warn(Color::Yellow)
		.info(Color::Green)
		.debug(Color::Blue)
		.trace(Color::BrightBlack);

	fern::Dispatch::new()
		.format(move |out, message, record| {
			out.finish(format_args!(
				"{} {:<5} [{}] {}",
				chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f"),
				colors.color(record.level()),
				record.target(),
				message
			))
		})
		.level(level)
		.level_for("hyper", LevelFilter::Warn)
		.level_for("hyper_util", LevelFilter::Warn)
		.level_for("reqwest", LevelFilter::Warn)
		.level_for("rustls", LevelFilter::Warn)
		.chain(std::io::stderr())
		.apply()
		.map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

	Ok(())
}
