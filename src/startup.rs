use crate::configuration::Settings;
use crate::mcp;
use crate::mcp::{EndpointManager, SessionStore, ToolRegistry};
use crate::routes;
use actix_cors::Cors;
use actix_web::{dev::Server, web, App, HttpServer};
use std::net::TcpListener;
use std::sync::Arc;
use tracing_actix_web::TracingLogger;

pub async fn run(
    listener: TcpListener,
    store: Arc<dyn SessionStore>,
    settings: Settings,
) -> Result<Server, std::io::Error> {
    let settings = web::Data::new(settings);

    // Tools are registered once, before the registry is handed to the
    // endpoint manager.
    let mut registry = ToolRegistry::new();
    mcp::tools::register_defaults(&mut registry);
    let registry = Arc::new(registry);

    let manager = web::Data::new(EndpointManager::new(
        store.clone(),
        registry,
        &settings.mcp,
    ));

    let server = HttpServer::new(move || {
        App::new()
            .wrap(TracingLogger::default())
            .wrap(Cors::permissive())
            .service(routes::health_check)
            .service(routes::mcp_handler)
            .service(routes::mcp_probe)
            .service(routes::mcp_terminate)
            .app_data(manager.clone())
            .app_data(settings.clone())
    })
    .listen(listener)?
    .run();

    Ok(server)
}
