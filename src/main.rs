use std::net::SocketAddr;

use davgate::admin::admin_routes;
use davgate::common::config::AppConfig;
use davgate::common::di::AppState;
use davgate::security::headers::security_header_layers;
use davgate::webdav::webdav_routes;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env()?;
    let webdav_bind = config.server.bind_addr;
    let admin_bind = config.server.admin_bind_addr;

    let state = AppState::build(config);

    // §6: every response, on both surfaces, carries the full security
    // header set, folded on as a stack of layers rather than set by hand
    // in each handler.
    let webdav_app = security_header_layers()
        .into_iter()
        .fold(webdav_routes().with_state(state.clone()), |router, layer| router.layer(layer));
    let admin_app = security_header_layers()
        .into_iter()
        .fold(admin_routes().with_state(state), |router, layer| router.layer(layer));

    tracing::info!(%webdav_bind, %admin_bind, "starting davgate");

    let webdav_server = axum_server::bind(webdav_bind)
        .serve(webdav_app.into_make_service_with_connect_info::<SocketAddr>());
    let admin_server = axum_server::bind(admin_bind)
        .serve(admin_app.into_make_service_with_connect_info::<SocketAddr>());

    tokio::try_join!(
        async { webdav_server.await.map_err(anyhow::Error::from) },
        async { admin_server.await.map_err(anyhow::Error::from) },
    )?;

    Ok(())
}
