use std::{future::IntoFuture, pin::pin, process, sync::Arc};

use holmok::{
    application::{
        categories::PhotoCategoryService, error::AppError, photos::PhotoService,
        users::UserService, users::hash_password,
    },
    cache::CacheConfig,
    config,
    infra::{db::PostgresRepositories, error::InfraError, http, telemetry},
    session::{IdentityTokens, SessionManager, SystemClock, TokenSecret},
};
use clap::Parser;
use tokio::signal;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let cli_args = config::CliArgs::parse();

    if let Some(config::Command::HashPassword(args)) = cli_args.command.as_ref() {
        println!("{}", hash_password(&args.password));
        return Ok(());
    }

    let settings = config::load(&cli_args)
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;
    telemetry::init(&settings.logging).map_err(AppError::from)?;
    run_serve(settings).await
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    let state = build_http_state(repositories, &settings);
    let sessions = build_session_manager(&settings)?;
    let router = http::build_router(state, sessions);

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    info!(
        target = "holmok::serve",
        addr = %settings.server.addr,
        "listening"
    );

    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let server = axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            let _ = stop_tx.send(());
        })
        .into_future();
    let mut server = pin!(server);

    tokio::select! {
        result = &mut server => {
            return result.map_err(|err| AppError::unexpected(format!("server error: {err}")));
        }
        _ = stop_rx => {}
    }

    match tokio::time::timeout(settings.server.graceful_shutdown, server).await {
        Ok(result) => result.map_err(|err| AppError::unexpected(format!("server error: {err}"))),
        Err(_) => {
            warn!(
                target = "holmok::serve",
                timeout_secs = settings.server.graceful_shutdown.as_secs(),
                "graceful shutdown timed out; dropping open connections"
            );
            Ok(())
        }
    }
}

async fn init_repositories(
    settings: &config::Settings,
) -> Result<Arc<PostgresRepositories>, AppError> {
    let database_url = settings
        .database
        .url
        .as_ref()
        .ok_or_else(|| InfraError::configuration("database url is not configured"))
        .map_err(AppError::from)?;

    let pool =
        PostgresRepositories::connect(database_url, settings.database.max_connections.get())
            .await
            .map_err(|err| AppError::from(InfraError::from(err)))?;

    PostgresRepositories::run_migrations(&pool)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    Ok(Arc::new(PostgresRepositories::new(pool)))
}

fn build_http_state(
    repositories: Arc<PostgresRepositories>,
    settings: &config::Settings,
) -> http::HttpState {
    let cache_config = CacheConfig::from(&settings.cache);

    let categories = PhotoCategoryService::new(
        repositories.clone(),
        repositories.clone(),
        PhotoCategoryService::caches_for(&cache_config),
    );
    let photos = PhotoService::new(
        repositories.clone(),
        repositories.clone(),
        PhotoService::caches_for(&cache_config),
    );
    let users = UserService::new(repositories.clone(), repositories.clone());

    http::HttpState {
        categories: Arc::new(categories),
        photos: Arc::new(photos),
        users: Arc::new(users),
        health: repositories,
    }
}

fn build_session_manager(settings: &config::Settings) -> Result<Arc<SessionManager>, AppError> {
    let session = &settings.session;
    let secret = TokenSecret::new(session.secret.clone()).map_err(InfraError::from)?;
    let tokens = IdentityTokens::new(&secret, Arc::new(SystemClock));
    Ok(Arc::new(SessionManager::new(
        tokens,
        session.cookie_key(),
        session.cookie_name.clone(),
        session.token_ttl,
        session.cookie_max_age,
    )))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!(target = "holmok::serve", error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                error!(target = "holmok::serve", error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!(target = "holmok::serve", "shutdown signal received");
}
