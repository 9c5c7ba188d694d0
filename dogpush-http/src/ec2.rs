use std::time::Duration;

use crate::{Error, HttpClient, HttpRequest, Result};

pub const EC2_INSTANCE_ID_URL: &str = "http://169.254.169.254/latest/meta-data/instance-id";

// The metadata service is link-local; anything slower means we are not on EC2.
const METADATA_TIMEOUT: Duration = Duration::from_secs(2);

/// Looks up this machine's EC2 instance id.
pub async fn ec2_instance_id(client: &HttpClient) -> Result<String> {
    ec2_instance_id_from(client, EC2_INSTANCE_ID_URL).await
}

pub async fn ec2_instance_id_from(client: &HttpClient, url: &str) -> Result<String> {
    let res = client
        .request(HttpRequest::get(url).timeout(Some(METADATA_TIMEOUT)))
        .await?;
    let body = res.body_utf8().unwrap_or_default().trim().to_string();
    if !res.is_success() || body.is_empty() {
        return Err(Error::Status {
            status: res.status,
            body,
        });
    }
    Ok(body)
}
