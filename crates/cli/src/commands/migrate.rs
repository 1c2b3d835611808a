use crate::commands::{async_runtime, load_config, CommandResult, EXIT_REGISTRY};
use wsgate_db::{connect_with_settings, migrations};

pub fn run() -> CommandResult {
    let config = match load_config("migrate") {
        Ok(config) => config,
        Err(result) => return result,
    };

    let runtime = match async_runtime("migrate") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let pool = connect_with_settings(
            &config.registry.url,
            config.registry.max_connections,
            config.registry.timeout_secs,
        )
        .await
        .map_err(|error| ("registry_connectivity", error.to_string()))?;
        migrations::run_pending(&pool).await.map_err(|error| ("migration", error.to_string()))?;
        pool.close().await;
        Ok::<(), (&'static str, String)>(())
    });

    match result {
        Ok(()) => CommandResult::success(
            "migrate",
            format!("applied pending registry migrations to `{}`", config.registry.url),
        ),
        Err((error_class, message)) => {
            CommandResult::failure("migrate", error_class, message, EXIT_REGISTRY)
        }
    }
}
