use streamgate::error::StartupError;

#[tokio::main]
async fn main() -> Result<(), StartupError> {
    streamgate::start_server().await
}
