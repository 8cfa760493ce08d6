use std::time::Duration;

use bevy::{app::ScheduleRunnerPlugin, log::LogPlugin, prelude::*};
use chain_cascade::ChainLightningPlugin;

mod sandbox;

fn main() {
    App::new()
        .add_plugins((
            MinimalPlugins.set(ScheduleRunnerPlugin::run_loop(Duration::from_secs_f64(
                1.0 / 60.0,
            ))),
            LogPlugin::default(),
        ))
        .add_plugins((ChainLightningPlugin, sandbox::SandboxPlugin))
        .run();
}
