//! Network seam shared by the request cache and the offline worker.
//!
//! Everything that leaves the process goes through a [`Transport`]. The host
//! environment (session token, online/offline signal) is injected through the
//! small traits in [`host`].

mod host;
mod request;
mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use host::{Connectivity, ConnectivityFlag, EnvSession, SessionProvider, StaticSession};
pub use request::{HttpRequest, HttpResponse, MultipartPart, RequestBody, RequestMode};
pub use transport::{ReqwestTransport, Transport, TransportError};
