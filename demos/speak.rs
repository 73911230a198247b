use std::error::Error;

use campfire_sdk::{Client, RecentOptions};
use secrecy::SecretString;

fn main() -> Result<(), Box<dyn Error>> {
    let account = "REPLACE_WITH_ACCOUNT".to_string();
    let token = "REPLACE_WITH_API_TOKEN".to_string();

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        let client = Client::new(&account, SecretString::new(token))?;
        let me = client.me().await?;
        println!("signed in as {}", me.name.as_deref().unwrap_or("?"));

        for room in client.rooms().await? {
            println!("room id={} name={:?}", room.id, room.name);
        }

        let Some(room) = client.presence().await?.into_iter().next() else {
            println!("not present in any room");
            return Ok(());
        };

        if let Some(sent) = room.speak("hello from rust").await? {
            let recent = room
                .recent_messages(&RecentOptions {
                    limit: Some(10),
                    since_message_id: Some(sent.id.saturating_sub(10)),
                })
                .await?;
            println!("{} messages around id={}", recent.len(), sent.id);
        }

        Ok::<(), Box<dyn Error>>(())
    })
}
