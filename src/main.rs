use std::{process, sync::Arc, time::Duration};

use sitemapper::{
    application::{
        error::AppError,
        repos::{ContentRepo, SiteRegistry, TaxonomyRepo},
        sitemap::{SitemapOptions, SitemapService},
    },
    cache::{CacheConfig, CacheTrigger, SitemapCache, namespace_for},
    config,
    domain::entities::SiteProfile,
    infra::{
        db::PostgresRepositories,
        error::InfraError,
        http::{self, AdminState, HttpState, SitemapLink},
        telemetry,
    },
    presentation::views::sitemap_link,
};
use tokio::{sync::watch, try_join};
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
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::CheckConfig(args) => run_check_config(&settings, &args),
    }
}

fn run_check_config(
    settings: &config::Settings,
    args: &config::CheckConfigArgs,
) -> Result<(), AppError> {
    site_profile(settings)?;
    let public_addr = settings.server.public_addr;
    let admin_addr = settings.server.admin_addr;
    info!(
        target = "sitemapper::config",
        %public_addr,
        %admin_addr,
        site = %settings.site.public_url,
        "Configuration is valid"
    );
    if args.print {
        println!("{settings:#?}");
    }
    Ok(())
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    let (http_state, admin_state) = build_application_context(repositories, &settings)?;
    serve_http(&settings, http_state, admin_state).await
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

    let pool = PostgresRepositories::connect(database_url, settings.database.max_connections.get())
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    PostgresRepositories::run_migrations(&pool)
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    Ok(Arc::new(PostgresRepositories::new(pool)))
}

fn site_profile(settings: &config::Settings) -> Result<SiteProfile, AppError> {
    SiteProfile::new(
        &settings.site.public_url,
        settings.site.name.clone(),
        settings.site.language.clone(),
        settings.site.timezone,
        settings.site.public,
    )
    .map_err(AppError::from)
}

fn sitemap_options(settings: &config::SitemapSettings) -> Result<SitemapOptions, AppError> {
    let recent_window = time::Duration::try_from(settings.recent_window)
        .map_err(|err| AppError::validation(format!("sitemap.recent_window_days: {err}")))?;
    Ok(SitemapOptions {
        page_size: settings.page_size,
        recent_window,
        max_urls: settings.max_urls_per_document,
        debug_info: settings.debug_info,
    })
}

fn build_application_context(
    repositories: Arc<PostgresRepositories>,
    settings: &config::Settings,
) -> Result<(HttpState, AdminState), AppError> {
    let content_repo: Arc<dyn ContentRepo> = repositories.clone();
    let taxonomy_repo: Arc<dyn TaxonomyRepo> = repositories.clone();
    let site_registry: Arc<dyn SiteRegistry> = repositories;

    let site = site_profile(settings)?;

    let cache_config = CacheConfig::from(&settings.cache);
    let cache = cache_config.enabled.then(|| {
        Arc::new(SitemapCache::new(
            namespace_for(&site.sitemap_url()),
            &cache_config,
        ))
    });

    let head_link = SitemapLink {
        tag: sitemap_link(&site.sitemap_url())
            .map_err(|err| AppError::unexpected(err.to_string()))?,
        admin_prefix: settings.site.admin_prefix.clone(),
    };

    let sitemap_service = Arc::new(SitemapService::new(
        content_repo.clone(),
        taxonomy_repo,
        site_registry,
        site,
        sitemap_options(&settings.sitemap)?,
        cache.clone(),
    ));

    let trigger = CacheTrigger::new(cache, sitemap_service.clock());

    let http_state = HttpState {
        sitemap: sitemap_service,
        robots_base: Arc::from(settings.site.robots.as_str()),
        head_link,
    };

    let admin_state = AdminState {
        trigger,
        store: content_repo,
    };

    Ok((http_state, admin_state))
}

async fn serve_http(
    settings: &config::Settings,
    http_state: HttpState,
    admin_state: AdminState,
) -> Result<(), AppError> {
    let public_router = http::build_router(http_state);
    let admin_router = http::build_admin_router(admin_state);

    let public_addr = settings.server.public_addr;
    let admin_addr = settings.server.admin_addr;
    let public_listener = tokio::net::TcpListener::bind(public_addr)
        .await
        .map_err(|err| AppError::from(InfraError::bind(public_addr, err)))?;
    let admin_listener = tokio::net::TcpListener::bind(admin_addr)
        .await
        .map_err(|err| AppError::from(InfraError::bind(admin_addr, err)))?;

    info!(
        target = "sitemapper::serve",
        %public_addr,
        %admin_addr,
        "Listening"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    let public_server = axum::serve(public_listener, public_router.into_make_service())
        .with_graceful_shutdown(wait_for_shutdown(shutdown_rx.clone()));
    let admin_server = axum::serve(admin_listener, admin_router.into_make_service())
        .with_graceful_shutdown(wait_for_shutdown(shutdown_rx.clone()));

    let grace = settings.server.graceful_shutdown;
    tokio::select! {
        result = async { try_join!(public_server, admin_server) } => {
            result.map_err(|err| AppError::from(InfraError::Server(err)))?;
        }
        () = drain_deadline(shutdown_rx, grace) => {
            warn!(
                target = "sitemapper::serve",
                grace_seconds = grace.as_secs(),
                "Graceful shutdown window elapsed with requests still in flight"
            );
        }
    }

    info!(target = "sitemapper::serve", "Shut down");
    Ok(())
}

async fn wait_for_shutdown(mut shutdown: watch::Receiver<bool>) {
    while !*shutdown.borrow_and_update() {
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

async fn drain_deadline(shutdown: watch::Receiver<bool>, grace: Duration) {
    wait_for_shutdown(shutdown).await;
    tokio::time::sleep(grace).await;
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
    info!(target = "sitemapper::serve", "Shutdown signal received");
}
