pub mod app;
pub mod cache;
pub mod config;
pub mod exception;
pub mod fetch;
pub mod handler;
pub mod negotiate;
pub mod page;
pub mod param;
pub mod request;
pub mod response;
pub mod router;
pub mod sanitize;
pub mod state;
pub mod template;
pub mod to_xml;
pub mod users;
pub mod util;
pub mod value;

pub use app::App;
pub use cache::{CacheStore, MemoryStore};
pub use config::{Config, Environment};
pub use exception::{Exception, Failure, HandlerError};
pub use handler::{dispatch, Handler, Reply};
pub use page::{Page, PageResult};
pub use param::{HttpEncoding, HttpRequestMethod, HttpVersion, Representation};
pub use request::Request;
pub use response::Response;
pub use router::{RouteMatch, Router};
pub use sanitize::sanitize;
pub use state::ResponseState;
pub use template::{FileTemplates, TemplateEngine};
pub use to_xml::to_xml;
pub use value::{fields, Fields, Sanitizable, Value};
