#![forbid(unsafe_code)]

mod client;
mod ec2;
mod error;
mod series;
mod types;
mod util;

pub use client::HttpClient;
pub use ec2::{EC2_INSTANCE_ID_URL, ec2_instance_id, ec2_instance_id_from};
pub use error::{Error, HttpErrorKind, Result};
pub use series::{HttpSeriesRequest, HttpTransport, SERIES_PATH};
pub use types::{HttpRequest, HttpResponse};
