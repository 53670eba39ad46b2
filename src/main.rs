use log::info;
use opentelemetry::global;
use opentelemetry::global::shutdown_tracer_provider;
use tokio::signal;

use rs_acne_analysis_svc::config::settings::SETTINGS;
use rs_acne_analysis_svc::logger::logger::setup_logger;
use rs_acne_analysis_svc::pipeline::analysis_pipeline::analysis_pipeline::AnalysisPipeline;
use rs_acne_analysis_svc::pipeline::model_config::config::RecommendationTable;
use rs_acne_analysis_svc::routes::root::{root_routes, RouterState};
use rs_acne_analysis_svc::tracer::tracer::init_tracer_provider;

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

#[tokio::main]
async fn main() {
    // Setup logger
    setup_logger();
    let addr = format!("0.0.0.0:{}", SETTINGS.server.http_port);

    // Load model capabilities and lookup tables once per process
    let analysis_pipeline = AnalysisPipeline::new(&SETTINGS.models)
        .unwrap_or_else(|e| panic!("Failed to init analysis pipeline: {}", e));
    let recommendations = RecommendationTable::load(&SETTINGS.models.recommendations)
        .unwrap_or_else(|e| panic!("Failed to load recommendation table: {}", e));
    info!("completed initializing analysis pipeline");

    // Setup tracing
    let tracer_provider = init_tracer_provider().expect("Failed to initialize tracer provider.");
    global::set_tracer_provider(tracer_provider.clone());

    // Init server
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| panic!("Failed to create new listener: {}", e));
    info!("starting api server on {:?}", addr);
    let router_state = RouterState::new(analysis_pipeline, recommendations);

    axum::serve(listener, root_routes(router_state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .unwrap_or_else(|e| panic!("Failed to start api server: {}", e));

    shutdown_tracer_provider();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
