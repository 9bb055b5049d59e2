use std::sync::Arc;

use traffic_forecast::{
    forecast_router, init_logging, log_app_bind, log_app_start, log_paths_selected,
    logging_config_from_env, pipeline_config_from_env, server_addr_from_env, ForecastPipeline,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let logging_cfg = logging_config_from_env("forecast_server");
    init_logging(&logging_cfg)?;
    log_app_start(&logging_cfg);

    let pipeline_cfg = pipeline_config_from_env()?;
    log_paths_selected("forecast_server", &pipeline_cfg);

    let addr = server_addr_from_env()?;
    let pipeline = Arc::new(ForecastPipeline::from_config(&pipeline_cfg));
    let app = forecast_router(pipeline);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;

    log_app_bind(bound_addr);
    axum::serve(listener, app).await?;

    Ok(())
}
