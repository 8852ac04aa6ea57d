use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{mpsc, Notify};
use uuid::Uuid;

use crate::config::Config;
use crate::georoute::GeoRouter;
use crate::models::driver::Driver;
use crate::models::merchant::Merchant;
use crate::models::offer::Offer;
use crate::models::order::Order;
use crate::notify::Notifier;
use crate::observability::metrics::Metrics;
use crate::tracking::TrackingRooms;

pub struct AppState {
    pub config: Config,
    pub merchants: DashMap<Uuid, Merchant>,
    pub drivers: DashMap<Uuid, Driver>,
    pub orders: DashMap<Uuid, Order>,
    pub offers: DashMap<Uuid, Offer>,
    /// Feeds READY orders to the dispatch engine.
    pub dispatch_tx: mpsc::Sender<Uuid>,
    /// One waker per in-flight dispatch; presence doubles as the
    /// "already dispatching" guard that keeps re-entry idempotent.
    pub dispatch_wakers: DashMap<Uuid, Arc<Notify>>,
    pub rooms: TrackingRooms,
    pub geo: Arc<dyn GeoRouter>,
    pub notifier: Arc<dyn Notifier>,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(
        config: Config,
        geo: Arc<dyn GeoRouter>,
        notifier: Arc<dyn Notifier>,
    ) -> (Self, mpsc::Receiver<Uuid>) {
        let (dispatch_tx, dispatch_rx) = mpsc::channel(config.dispatch_queue_size);
        let rooms = TrackingRooms::new(config.room_buffer_size);

        (
            Self {
                config,
                merchants: DashMap::new(),
                drivers: DashMap::new(),
                orders: DashMap::new(),
                offers: DashMap::new(),
                dispatch_tx,
                dispatch_wakers: DashMap::new(),
                rooms,
                geo,
                notifier,
                metrics: Metrics::new(),
            },
            dispatch_rx,
        )
    }
}
