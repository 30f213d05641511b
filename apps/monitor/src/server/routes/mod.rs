use actix_web::web::ServiceConfig;

mod health;
mod inbound;

pub fn routes(cfg: &mut ServiceConfig) {
    cfg.service(health::health_route).service(inbound::inbound_route);
}
