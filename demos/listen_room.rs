use std::error::Error;

use campfire_sdk::Client;
use secrecy::SecretString;
use tokio::sync::mpsc;

fn main() -> Result<(), Box<dyn Error>> {
    let account = "REPLACE_WITH_ACCOUNT".to_string();
    let token = "REPLACE_WITH_API_TOKEN".to_string();
    let room_id = 1;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        let client = Client::new(&account, SecretString::new(token))?;
        let mut room = client.room(room_id).await?;
        room.join().await?;

        let (message_tx, mut message_rx) = mpsc::unbounded_channel();
        room.listen(move |message| {
            let _ = message_tx.send(message);
        });

        while let Some(message) = message_rx.recv().await {
            let kind = message
                .kind
                .as_ref()
                .map(|kind| kind.to_string())
                .unwrap_or_default();
            println!(
                "[{kind}] user={:?} body={}",
                message.user_id,
                message.body.as_deref().unwrap_or_default()
            );
            if message.body.as_deref() == Some("!quit") {
                break;
            }
        }

        room.stop_listening();
        room.leave().await?;
        Ok::<(), Box<dyn Error>>(())
    })
}
