use std::sync::Arc;

use hitch_dispatch::DispatchEngine;
use hitch_presence::PresenceRegistry;
use hitch_router::FanoutRouter;
use hitch_store::TripRepository;

#[derive(Clone)]
pub struct AppState {
    pub trips: Arc<dyn TripRepository>,
    pub presence: Arc<PresenceRegistry>,
    pub router: Arc<FanoutRouter>,
    pub engine: Arc<DispatchEngine>,
}
