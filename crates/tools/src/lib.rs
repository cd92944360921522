//! Platform tool clients: the web reader/session cache/SERP stack, the
//! code-interpreter sandbox proxy, the shell worker, and the vector-store
//! search service. Each client owns its wire contract; the gateway's
//! platform glue owns the Action lifecycle around them.

pub mod sandbox;
pub mod shell;
pub mod vector;
pub mod web;

pub use sandbox::{SandboxClient, SandboxFile};
pub use shell::ShellClient;
pub use vector::{VectorHit, VectorSearchClient};
pub use web::reader::WebReader;
pub use web::session::WebSessionCache;
