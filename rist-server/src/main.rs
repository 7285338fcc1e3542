#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

mod config;
mod context;

use config::Config;

fn main() -> anyhow::Result<()> {
    let config = Config::load()?;
    simple_logger::init_with_level(config.log.level.as_level())?;

    log::info!("starting rist-server, listening on {}", config.rist.listen);

    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.rist.threads)
        .enable_all()
        .build()?
        .block_on(context::run(config))
}
