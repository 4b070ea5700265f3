use minigame_client::prelude::*;

fn main() -> anyhow::Result<()> {
    let config = Configuration::from_env()?;
    let mut dispatcher = Dispatcher::from_config(&config)?;
    dispatcher.run();
    Ok(())
}
