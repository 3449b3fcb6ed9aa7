use crate::{api::presence, auth::middleware::auth_middleware, presence::store::PresenceStore};
use actix_governor::{
    Governor, GovernorConfigBuilder, PeerIpKeyExtractor, governor::middleware::NoOpMiddleware,
};
use actix_web::{middleware::from_fn, web};
use anyhow::anyhow;
use std::sync::Arc;

pub type Limiter = Governor<PeerIpKeyExtractor, NoOpMiddleware>;

/// Per-IP limiter allowing `requests_per_min` with a burst of the same size.
pub fn build_limiter(requests_per_min: u32) -> anyhow::Result<Limiter> {
    let per_ms = if requests_per_min == 0 {
        1
    } else {
        (60_000 / requests_per_min as u64).max(1)
    };
    let cfg = GovernorConfigBuilder::default()
        .per_millisecond(per_ms)
        .burst_size(requests_per_min.max(1))
        .key_extractor(PeerIpKeyExtractor)
        .finish()
        .ok_or_else(|| anyhow!("Invalid rate limit: {requests_per_min} requests per minute"))?;
    Ok(Governor::new(&cfg))
}

pub fn configure<S: PresenceStore>(
    cfg: &mut web::ServiceConfig,
    api_prefix: &str,
    limiter: Arc<Limiter>,
) {
    cfg.service(
        web::scope(api_prefix).service(
            web::scope("/presence")
                .wrap(from_fn(auth_middleware)) // authentication
                .wrap(limiter) // rate limiting
                .service(
                    web::scope("/sheets")
                        // /presence/sheets
                        .service(
                            web::resource("")
                                .route(web::post().to(presence::open_sheet::<S>))
                                .route(web::get().to(presence::list_sheets::<S>)),
                        )
                        // /presence/sheets/date/{date}
                        .service(
                            web::resource("/date/{date}")
                                .route(web::get().to(presence::sheet_by_date::<S>)),
                        )
                        // /presence/sheets/{id}
                        .service(
                            web::resource("/{id}").route(web::get().to(presence::get_sheet::<S>)),
                        )
                        // /presence/sheets/{id}/validate
                        .service(
                            web::resource("/{id}/validate")
                                .route(web::put().to(presence::validate_sheet::<S>)),
                        ),
                )
                // /presence/records/{id}/justification
                .service(
                    web::resource("/records/{id}/justification")
                        .route(web::post().to(presence::justify_record::<S>)),
                ),
        ),
    );
}
