use traffic_forecast::{
    init_logging, log_app_start, log_paths_selected, logging_config_from_env,
    pipeline_config_from_env, ForecastPipeline,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let logging_cfg = logging_config_from_env("retrain");
    init_logging(&logging_cfg)?;
    log_app_start(&logging_cfg);

    let pipeline_cfg = pipeline_config_from_env()?;
    log_paths_selected("retrain", &pipeline_cfg);

    let summary = ForecastPipeline::from_config(&pipeline_cfg).retrain()?;

    println!("Retraining completed");
    println!("Model saved to: {}", pipeline_cfg.model_path.display());
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
