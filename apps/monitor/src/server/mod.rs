//! Inbound webhook the SMS gateway pushes replies to.

mod error;
mod routes;

pub use error::ServerError;

use std::net::SocketAddr;
use std::sync::Arc;

use actix_web::dev::Server;
use actix_web::{App, HttpServer, web};
use tracing::info;

use crate::config::InboundConfig;
use crate::monitoring::correlator::Correlator;

/// Bind the webhook server. The returned server runs once awaited.
pub fn build_server(config: &InboundConfig, correlator: Arc<Correlator>) -> Result<Server, ServerError> {
    let addr: SocketAddr = format!("{}:{}", config.bind, config.port).parse()?;
    let correlator = web::Data::from(correlator);

    let server = HttpServer::new(move || App::new().app_data(correlator.clone()).configure(routes::routes))
        .workers(1)
        .disable_signals()
        .bind(addr)?
        .run();

    info!("Inbound webhook listening on {}", addr);
    Ok(server)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::MonitoredService;
    use crate::database::{Database, DatabaseImpl, initialize_database};
    use crate::monitoring::clock::SystemClock;
    use crate::monitoring::prober::SmsProber;
    use crate::notify::Notifier;
    use crate::notify::mailer::RecordingMailer;
    use crate::transport::sms::RecordingTransport;
    use actix_web::http::StatusCode;
    use actix_web::test;
    use serde_json::{Value, json};

    async fn correlator(dir: &tempfile::TempDir) -> (Arc<dyn Database>, Arc<Correlator>) {
        let pool = crate::pool::connect(dir.path().join("monitor.db").to_str().unwrap()).await.unwrap();
        initialize_database(&pool.get().await.unwrap()).await.unwrap();
        let database: Arc<dyn Database> = Arc::new(DatabaseImpl::new_from_pool(pool));
        let correlator = Correlator::new(
            database.clone(),
            Arc::new(SmsProber::new(Arc::new(RecordingTransport::default()))),
            Arc::new(Notifier::new(Arc::new(RecordingMailer::default()))),
            Arc::new(SystemClock),
        );
        (database, Arc::new(correlator))
    }

    #[actix_web::test]
    async fn health_answers_ok() {
        let dir = tempfile::tempdir().unwrap();
        let (_, correlator) = correlator(&dir).await;
        let app = test::init_service(App::new().app_data(web::Data::from(correlator)).configure(routes::routes)).await;

        let response = test::call_service(&app, test::TestRequest::get().uri("/health").to_request()).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[actix_web::test]
    async fn inbound_reply_is_correlated() {
        let dir = tempfile::tempdir().unwrap();
        let (database, correlator) = correlator(&dir).await;
        let id = database
            .save_service(&MonitoredService::sms("gateway", "+15550100", "PING", "ops@example.org"))
            .await
            .unwrap();
        let sent_at = chrono::Utc::now();
        assert!(database.mark_request_sent(id, None, sent_at).await.unwrap());

        let app = test::init_service(App::new().app_data(web::Data::from(correlator)).configure(routes::routes)).await;

        let request = test::TestRequest::post()
            .uri("/sms/inbound")
            .set_json(json!({ "from": "+15550100", "text": "PONG" }))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, request).await;
        assert_eq!(body, json!({ "outcome": "recorded", "service": "gateway", "state": "valid_response" }));

        // A second reply finds nothing outstanding
        let request = test::TestRequest::post()
            .uri("/sms/inbound")
            .set_json(json!({ "from": "+15550100", "text": "PONG" }))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, request).await;
        assert_eq!(body["outcome"], "stale");

        let request = test::TestRequest::post()
            .uri("/sms/inbound")
            .set_json(json!({ "from": "+15559999", "text": "hello" }))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, request).await;
        assert_eq!(body, json!({ "outcome": "ignored" }));
    }

    #[actix_web::test]
    async fn broken_pattern_is_unprocessable() {
        let dir = tempfile::tempdir().unwrap();
        let (database, correlator) = correlator(&dir).await;
        let id = database
            .save_service(
                &MonitoredService::sms("gateway", "+15550100", "PING", "ops@example.org").with_pattern("(unclosed"),
            )
            .await
            .unwrap();
        assert!(database.mark_request_sent(id, None, chrono::Utc::now()).await.unwrap());

        let app = test::init_service(App::new().app_data(web::Data::from(correlator)).configure(routes::routes)).await;
        let request = test::TestRequest::post()
            .uri("/sms/inbound")
            .set_json(json!({ "from": "+15550100", "text": "PONG" }))
            .to_request();
        let response = test::call_service(&app, request).await;
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let service = database.get_service(id).await.unwrap().unwrap();
        assert_eq!(service.ping_state, crate::monitoring::types::PingState::RequestSent);
    }
}
