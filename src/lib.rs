pub mod cache;
pub mod config;
pub mod context;
pub mod exception;
pub mod fs;
pub mod handler;
mod multipart;
pub mod param;
mod parser;
pub mod request;
pub mod response;
pub mod server;
pub mod transport;
pub mod upload;
pub mod util;

pub use config::Config;
pub use context::Context;
pub use exception::Exception;
pub use fs::{File, Filesystem, MemoryFile, StdFilesystem};
pub use handler::{FunctionHandler, RequestHandler, StaticHandler};
pub use param::{ClientStatus, HttpMethod};
pub use request::{Argument, Request};
pub use response::{ContentLength, Response};
pub use server::Server;
pub use transport::{Client, Clock, Listener, SystemClock, TcpClient, TcpServer};
pub use upload::{Upload, UploadStatus};
