mod plugin;

use plugin::HaystackPlugin;

#[grafana_plugin_sdk::main(
    services(data, diagnostics),
    init_subscriber = true,
)]
async fn plugin() -> HaystackPlugin {
    HaystackPlugin::new()
}
