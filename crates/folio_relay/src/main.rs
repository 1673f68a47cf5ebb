use clap::Parser;

use folio_relay::prelude::*;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let (args, config) = build_config(Args::parse())?;
    let args = merge_args_and_config(args, config)?;

    if args.print_config {
        print!("{}", toml::to_string(&args)?);
        return Ok(());
    }

    let config = RelayConfig::from_args(&args)?;

    if args.print_system {
        println!("{}", config.system);
        return Ok(());
    }

    run_server(AppState::new(config)).await
}
