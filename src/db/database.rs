use mongodb::{
    bson::doc,
    options::{ClientOptions, Credential},
    Client,
};

/// Build a client authenticated as the administrative principal against the
/// admin database, and verify both reachability and the credential with a
/// ping before any bootstrap step runs. A rejected credential or an
/// unreachable server surfaces here, before anything is mutated.
pub async fn connect(
    uri: &str,
    admin_username: &str,
    admin_password: &str,
) -> mongodb::error::Result<Client> {
    let mut client_options = ClientOptions::parse(uri).await?;
    client_options.app_name = Some("MongoBootstrap".to_string());
    client_options.credential = Some(
        Credential::builder()
            .username(admin_username.to_string())
            .password(admin_password.to_string())
            .source("admin".to_string())
            .build(),
    );

    let client = Client::with_options(client_options)?;
    client
        .database("admin")
        .run_command(doc! { "ping": 1 }, None)
        .await?;

    Ok(client)
}
