use traffic_forecast::{
    init_logging, log_app_start, log_paths_selected, logging_config_from_env,
    pipeline_config_from_env, ForecastPipeline,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let logging_cfg = logging_config_from_env("check_drift");
    init_logging(&logging_cfg)?;
    log_app_start(&logging_cfg);

    let pipeline_cfg = pipeline_config_from_env()?;
    log_paths_selected("check_drift", &pipeline_cfg);

    let pipeline = ForecastPipeline::from_config(&pipeline_cfg);
    let report = pipeline.check_drift()?;

    println!(
        "Drift report (window={}) written to {}",
        pipeline.drift_config().window,
        pipeline_cfg.drift_report_path.display()
    );
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
