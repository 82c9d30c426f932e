pub mod http;
pub mod traits;

pub use http::ReqwestTransport;
pub use traits::{BodyEncoding, HttpRequest, HttpResponse, HttpTransport, Method, RequestBody};
