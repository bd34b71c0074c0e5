//! Subscribes to `/chatter` as `std_msgs/String` and logs every message received, until
//! ctrl-c. Run against a real `roscore` and `rostopic pub /chatter std_msgs/String ...`.

use roslibrust_common::RosMessageType;
use roslibrust_ros1::{RegistryClient, Subscriber, SubscriberConfig, XmlRpcRegistryClient};
use std::sync::Arc;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct RosString {
    data: String,
}

impl RosMessageType for RosString {
    const ROS_TYPE_NAME: &'static str = "std_msgs/String";
    const MD5SUM: &'static str = "992ce8a1687cec8c8bd883ec73ca41d1";
    const DEFINITION: &'static str = "string data\n";
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let master_uri =
        std::env::var("ROS_MASTER_URI").unwrap_or_else(|_| "http://localhost:11311".to_string());
    let node_name = "/listener_rs";
    let node_api_uri = "http://localhost:0/";
    let registry: Arc<dyn RegistryClient> = Arc::new(XmlRpcRegistryClient::new(
        master_uri,
        node_name,
        "/chatter",
        node_api_uri,
    ));

    let config = SubscriberConfig::new(node_name, registry);
    let subscriber = Subscriber::<RosString>::new("/chatter", config)?;
    subscriber
        .subscribe(|msg: RosString| {
            log::info!("[/listener_rs] got message: {}", msg.data);
        })
        .await;

    tokio::signal::ctrl_c().await?;
    log::warn!("ctrl-c, shutting down");
    subscriber.shutdown().await;

    Ok(())
}
