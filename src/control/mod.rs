//! Control plane: next-hop resolution state, API surface, and the message
//! ring connecting it to the datapath workers.

mod api;
mod plane;
mod ring;

pub use api::{ApiNexthop, Nh6AddRequest, Nh6DelRequest, Nh6Info, Nh6ListRequest, Nh6ListResponse};
pub use plane::{ControlPlane, Handlers};
pub use ring::{ring, HandlerId, HandlerRegistry, Payload, RingReceiver, RingSender, StackMessage};
