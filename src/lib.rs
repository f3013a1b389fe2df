//! Exhibit Kiosk - detection relay and display engine
//!
//! ## Architecture (8 Components)
//!
//! 1. EventAdapter - raw detection payload normalization + recency dedup
//! 2. EventHub - typed publish/subscribe distribution
//! 3. MqttIngest - broker subscription feeding the adapter
//! 4. WebApi - SSE push channel + light trigger endpoint
//! 5. BatchWindow - fill/clear display state machine (the core)
//! 6. LightTrigger - rate-limited side-effect client
//! 7. TileRenderer - card lines, typewriter, grid frames
//! 8. Narration - paginated looping text playback
//!
//! ## Design Principles
//!
//! - The relay (1-4) and the kiosk engine (5-8) share nothing but the
//!   configured stream/trigger URLs
//! - All window mutations go through a single reconcile transition
//! - No failure is fatal to the process

pub mod batch_window;
pub mod error;
pub mod event_adapter;
pub mod event_hub;
pub mod kiosk;
pub mod light;
pub mod models;
pub mod mqtt_ingest;
pub mod narration;
pub mod state;
pub mod tile_renderer;
pub mod web_api;

pub use error::{Error, Result};
pub use state::AppState;
