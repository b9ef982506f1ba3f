use std::sync::Arc;

use actix_web::{web, App, HttpResponse, HttpServer, Responder};
use prometheus::{Encoder, Registry, TextEncoder};

use crate::models::Order;
use crate::service::{OrderService, ServiceError};

// ============================================================================
// HTTP API - thin routing over the order service
// ============================================================================
//
// POST /orders     202 accepted / 400 invalid / 500 publish failure
// GET  /orders/{id} 200 order    / 404 miss
// GET  /health      liveness
// GET  /metrics     Prometheus text exposition
//
// ============================================================================

/// Runs the API server until the process receives a termination signal;
/// actix installs the signal handler. The caller resumes after this returns
/// to shut the consumer down.
pub async fn run_http_server(
    service: OrderService,
    registry: Arc<Registry>,
    addr: &str,
) -> std::io::Result<()> {
    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(service.clone()))
            .app_data(web::Data::new(registry.clone()))
            .route("/orders", web::post().to(submit_order))
            .route("/orders/{id}", web::get().to(get_order))
            .route("/health", web::get().to(health_handler))
            .route("/metrics", web::get().to(metrics_handler))
    })
    .bind(addr)?
    .run()
    .await
}

async fn submit_order(
    service: web::Data<OrderService>,
    order: web::Json<Order>,
) -> impl Responder {
    match service.submit_order(order.into_inner()).await {
        Ok(()) => HttpResponse::Accepted().json(serde_json::json!({
            "status": "accepted"
        })),
        Err(ServiceError::Validation(error)) => {
            HttpResponse::BadRequest().json(serde_json::json!({
                "error": format!("invalid order: {error}")
            }))
        }
        Err(error) => {
            tracing::error!(error = %error, "order submission failed");
            HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "failed to accept order"
            }))
        }
    }
}

async fn get_order(
    service: web::Data<OrderService>,
    path: web::Path<String>,
) -> impl Responder {
    let order_uid = path.into_inner();
    match service.get_order(&order_uid).await {
        Ok(order) => HttpResponse::Ok().json(order),
        Err(ServiceError::NotFound(_)) => HttpResponse::NotFound().json(serde_json::json!({
            "error": "order not found"
        })),
        Err(error) => {
            tracing::error!(order_uid, error = %error, "order lookup failed");
            HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "lookup failed"
            }))
        }
    }
}

async fn health_handler() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "service": "order-ingest"
    }))
}

async fn metrics_handler(registry: web::Data<Arc<Registry>>) -> impl Responder {
    let encoder = TextEncoder::new();
    let metric_families = registry.gather();

    let mut buffer = Vec::new();
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => HttpResponse::Ok()
            .content_type("text/plain; version=0.0.4")
            .body(buffer),
        Err(error) => {
            tracing::error!(error = %error, "metrics encoding failed");
            HttpResponse::InternalServerError().finish()
        }
    }
}

// ============================================================================
// Handler Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::BoundedCache;
    use crate::messaging::mock::RecordingPublisher;
    use crate::metrics::Metrics;
    use crate::models::fixtures::sample_order;
    use crate::store::mock::MemoryStore;
    use actix_web::{http::StatusCode, test};

    struct TestApp {
        service: OrderService,
        store: Arc<MemoryStore>,
        publisher: Arc<RecordingPublisher>,
    }

    fn test_app() -> TestApp {
        let store = Arc::new(MemoryStore::new());
        let publisher = Arc::new(RecordingPublisher::new());
        let cache = Arc::new(BoundedCache::new(10).unwrap());
        let metrics = Arc::new(Metrics::new().unwrap());
        let service = OrderService::new(store.clone(), cache, publisher.clone(), metrics);
        TestApp {
            service,
            store,
            publisher,
        }
    }

    macro_rules! init_app {
        ($ctx:expr) => {
            test::init_service(
                App::new()
                    .app_data(web::Data::new($ctx.service.clone()))
                    .route("/orders", web::post().to(submit_order))
                    .route("/orders/{id}", web::get().to(get_order))
                    .route("/health", web::get().to(health_handler)),
            )
            .await
        };
    }

    #[actix_web::test]
    async fn test_post_valid_order_is_accepted() {
        let ctx = test_app();
        let app = init_app!(ctx);

        let req = test::TestRequest::post()
            .uri("/orders")
            .set_json(sample_order("o-http"))
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::ACCEPTED);
        assert_eq!(ctx.publisher.publish_count(), 1);
    }

    #[actix_web::test]
    async fn test_post_invalid_order_is_rejected() {
        let ctx = test_app();
        let app = init_app!(ctx);

        let mut order = sample_order("o-invalid");
        order.order_uid = String::new();
        let req = test::TestRequest::post()
            .uri("/orders")
            .set_json(order)
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(ctx.publisher.publish_count(), 0);
    }

    #[actix_web::test]
    async fn test_post_surfaces_publish_failure() {
        let ctx = test_app();
        ctx.publisher.fail_publishes(true);
        let app = init_app!(ctx);

        let req = test::TestRequest::post()
            .uri("/orders")
            .set_json(sample_order("o-down"))
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[actix_web::test]
    async fn test_get_known_order_returns_it() {
        let ctx = test_app();
        ctx.store.insert_existing(sample_order("o-get"));
        let app = init_app!(ctx);

        let req = test::TestRequest::get().uri("/orders/o-get").to_request();
        let order: Order = test::call_and_read_body_json(&app, req).await;
        assert_eq!(order.order_uid, "o-get");
    }

    #[actix_web::test]
    async fn test_get_unknown_order_is_404() {
        let ctx = test_app();
        let app = init_app!(ctx);

        let req = test::TestRequest::get().uri("/orders/nope").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn test_health_endpoint() {
        let ctx = test_app();
        let app = init_app!(ctx);

        let req = test::TestRequest::get().uri("/health").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }
}
