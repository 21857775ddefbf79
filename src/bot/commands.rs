//! Moderator command surface fed by webhook updates.
//!
//! Thin glue over the store and the platform client: moderators create and
//! delete link records and manage the block list from chat. Non-moderators
//! and blocked users are ignored without a reply.

use std::sync::Arc;

use serde::Deserialize;

use crate::bot::Platform;
use crate::store::{Destination, LinkAccess, LinkRecord, Store};
use crate::token::{self, Token};

const HELP_TEXT: &str = "Commands\n\n\
    /final <entity_id | url>\n\
    /first <entity_id | final | url> <short_link>\n\
    /delete <entity_id | final | first | url>\n\
    /block <user_id>\n\
    /unblock <user_id>\n\
    /blocklist\n\n\
    Moderators only";

/// Incoming webhook update (only the parts the router reads).
#[derive(Debug, Deserialize)]
pub struct Update {
    pub message: Option<IncomingMessage>,
    pub edited_message: Option<IncomingMessage>,
}

#[derive(Debug, Deserialize)]
pub struct IncomingMessage {
    pub text: Option<String>,
    pub from: Option<Sender>,
    pub chat: Chat,
}

#[derive(Debug, Deserialize)]
pub struct Sender {
    pub id: i64,
}

#[derive(Debug, Deserialize)]
pub struct Chat {
    pub id: i64,
}

/// Routes chat commands to their handlers.
pub struct CommandRouter {
    store: Arc<dyn Store>,
    platform: Arc<dyn Platform>,
    bot_username: String,
}

impl CommandRouter {
    pub fn new(store: Arc<dyn Store>, platform: Arc<dyn Platform>, bot_username: String) -> Self {
        Self {
            store,
            platform,
            bot_username,
        }
    }

    /// Process one webhook update. Never fails: command errors are logged
    /// and answered in-chat where a reply makes sense.
    pub async fn handle_update(&self, update: Update) {
        if let Some(message) = update.message {
            self.route(message).await;
        }
        if let Some(message) = update.edited_message {
            self.route(message).await;
        }
    }

    async fn route(&self, message: IncomingMessage) {
        let Some(text) = message.text.as_deref() else {
            return;
        };
        let Some(sender) = &message.from else {
            return;
        };
        match self.store.is_blocked(sender.id).await {
            Ok(true) => return,
            Ok(false) => {}
            Err(e) => {
                tracing::warn!(error = %e, "block lookup failed, dropping command");
                return;
            }
        }
        match self.store.is_moderator(sender.id).await {
            Ok(true) => {}
            Ok(false) => return,
            Err(e) => {
                tracing::warn!(error = %e, "moderator lookup failed, dropping command");
                return;
            }
        }

        let mut parts = text.split_whitespace();
        let Some(command) = parts.next() else {
            return;
        };
        let args: Vec<&str> = parts.collect();
        // In group chats commands arrive as /cmd@botname.
        let command = command.split('@').next().unwrap_or(command);

        let chat_id = message.chat.id;
        let sender_id = sender.id;
        match command {
            "/start" => self.reply(chat_id, HELP_TEXT).await,
            "/final" => self.cmd_final(chat_id, sender_id, &args).await,
            "/first" => self.cmd_first(chat_id, &args).await,
            "/delete" => self.cmd_delete(chat_id, &args).await,
            "/block" => self.cmd_block(chat_id, &args).await,
            "/unblock" => self.cmd_unblock(chat_id, &args).await,
            "/blocklist" => self.cmd_blocklist(chat_id).await,
            _ => {}
        }
    }

    async fn cmd_final(&self, chat_id: i64, sender_id: i64, args: &[&str]) {
        let Some(input) = args.first() else {
            self.reply(chat_id, "Usage: /final <entity_id | url>").await;
            return;
        };

        let destination = match parse_entity_ref(input) {
            Some(entity_id) => {
                match self.platform.is_entity_admin(entity_id, sender_id).await {
                    Ok(true) => Destination::Entity(entity_id),
                    Ok(false) => {
                        self.reply(chat_id, "You must be an administrator of that entity")
                            .await;
                        return;
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, entity_id, "role lookup failed");
                        self.reply(chat_id, "Could not verify your role in that entity")
                            .await;
                        return;
                    }
                }
            }
            None => Destination::Url((*input).to_string()),
        };

        let final_token = token::generate_final();
        let record = LinkRecord {
            final_token: final_token.clone(),
            access: LinkAccess::Direct,
            destination,
            owner_id: sender_id,
            force: false,
        };
        if let Err(e) = self.store.insert_link(&record).await {
            tracing::warn!(error = %e, "link insert failed");
            self.reply(chat_id, "Could not create the link").await;
            return;
        }

        self.reply(
            chat_id,
            &format!("Final created\n{}", self.app_url(&final_token)),
        )
        .await;
    }

    async fn cmd_first(&self, chat_id: i64, args: &[&str]) {
        let (Some(target), Some(short_link)) = (args.first(), args.get(1)) else {
            self.reply(chat_id, "Usage: /first <entity_id | final | url> <short_link>")
                .await;
            return;
        };

        let record = match self.resolve_target(target).await {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(error = %e, "target lookup failed");
                self.reply(chat_id, "Could not look up that link").await;
                return;
            }
        };
        let Some(record) = record else {
            self.reply(chat_id, "Final not found").await;
            return;
        };
        if matches!(record.access, LinkAccess::Gated { .. }) {
            self.reply(chat_id, "First already exists").await;
            return;
        }

        let first_token = token::generate_first();
        match self
            .store
            .set_gate(&record.final_token, &first_token, short_link)
            .await
        {
            Ok(true) => {
                self.reply(
                    chat_id,
                    &format!("First created\n{}", self.app_url(&first_token)),
                )
                .await;
            }
            // Lost a race against another /first on the same record.
            Ok(false) => self.reply(chat_id, "First already exists").await,
            Err(e) => {
                tracing::warn!(error = %e, "gate update failed");
                self.reply(chat_id, "Could not attach the first step").await;
            }
        }
    }

    async fn cmd_delete(&self, chat_id: i64, args: &[&str]) {
        let Some(raw) = args.first() else {
            self.reply(chat_id, "Usage: /delete <value>").await;
            return;
        };
        let value = token::normalize(raw);

        match self.store.delete_link_matching(value).await {
            Ok(0) => self.reply(chat_id, "Not found").await,
            Ok(_) => self.reply(chat_id, "Deleted").await,
            Err(e) => {
                tracing::warn!(error = %e, "link delete failed");
                self.reply(chat_id, "Could not delete").await;
            }
        }
    }

    async fn cmd_block(&self, chat_id: i64, args: &[&str]) {
        let Some(user_id) = args.first().and_then(|v| v.parse::<i64>().ok()) else {
            return;
        };
        match self.store.block(user_id).await {
            // Deliberately the same reply when the target is a moderator
            // and the block was a no-op.
            Ok(()) => self.reply(chat_id, &format!("Blocked {user_id}")).await,
            Err(e) => tracing::warn!(error = %e, user_id, "block failed"),
        }
    }

    async fn cmd_unblock(&self, chat_id: i64, args: &[&str]) {
        let Some(user_id) = args.first().and_then(|v| v.parse::<i64>().ok()) else {
            return;
        };
        match self.store.unblock(user_id).await {
            Ok(()) => self.reply(chat_id, &format!("Unblocked {user_id}")).await,
            Err(e) => tracing::warn!(error = %e, user_id, "unblock failed"),
        }
    }

    async fn cmd_blocklist(&self, chat_id: i64) {
        match self.store.blocklist().await {
            Ok(ids) if ids.is_empty() => self.reply(chat_id, "Blocklist is empty").await,
            Ok(ids) => {
                let listing = ids
                    .iter()
                    .map(|id| id.to_string())
                    .collect::<Vec<_>>()
                    .join("\n");
                self.reply(chat_id, &listing).await;
            }
            Err(e) => tracing::warn!(error = %e, "blocklist fetch failed"),
        }
    }

    /// Resolve a `/first` target: a final token (bare or deep-link form),
    /// an entity id, or a direct URL.
    async fn resolve_target(
        &self,
        target: &str,
    ) -> Result<Option<LinkRecord>, crate::error::DatabaseError> {
        if let Some(Token::Final(final_token)) = Token::parse(target) {
            return self.store.link_by_final(&final_token).await;
        }
        if let Some(entity_id) = parse_entity_ref(target) {
            return self.store.link_by_entity(entity_id).await;
        }
        self.store.link_by_direct_url(target).await
    }

    fn app_url(&self, token: &str) -> String {
        format!("https://t.me/{}/app?startapp={}", self.bot_username, token)
    }

    async fn reply(&self, chat_id: i64, text: &str) {
        if let Err(e) = self.platform.send_message(chat_id, text).await {
            tracing::warn!(error = %e, chat_id, "failed to send command reply");
        }
    }
}

/// Entity ids are the negative `-100...` channel/supergroup identifiers.
fn parse_entity_ref(value: &str) -> Option<i64> {
    if !value.starts_with("-100") {
        return None;
    }
    value.parse::<i64>().ok()
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::error::PlatformError;
    use crate::store::{LibSqlStore, LinkStore, ModerationStore};

    /// Scripted platform double that records outgoing messages.
    struct ScriptedPlatform {
        sent: Mutex<Vec<(i64, String)>>,
        admin: bool,
    }

    impl ScriptedPlatform {
        fn new(admin: bool) -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
                admin,
            }
        }

        fn last_reply(&self) -> Option<String> {
            self.sent.lock().unwrap().last().map(|(_, text)| text.clone())
        }

        fn reply_count(&self) -> usize {
            self.sent.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Platform for ScriptedPlatform {
        async fn create_single_use_invite(&self, _entity_id: i64) -> Result<String, PlatformError> {
            Ok("https://t.me/+invite".to_string())
        }

        async fn is_entity_admin(
            &self,
            _entity_id: i64,
            _user_id: i64,
        ) -> Result<bool, PlatformError> {
            Ok(self.admin)
        }

        async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), PlatformError> {
            self.sent.lock().unwrap().push((chat_id, text.to_string()));
            Ok(())
        }
    }

    const MOD_ID: i64 = 500;

    async fn setup(admin: bool) -> (CommandRouter, Arc<LibSqlStore>, Arc<ScriptedPlatform>) {
        let store = Arc::new(LibSqlStore::new_memory().await.unwrap());
        store.migrate().await.unwrap();
        store.add_moderator(MOD_ID).await.unwrap();
        let platform = Arc::new(ScriptedPlatform::new(admin));
        let router = CommandRouter::new(store.clone(), platform.clone(), "gatekeeperbot".to_string());
        (router, store, platform)
    }

    fn command(text: &str, sender_id: i64) -> Update {
        Update {
            message: Some(IncomingMessage {
                text: Some(text.to_string()),
                from: Some(Sender { id: sender_id }),
                chat: Chat { id: 42 },
            }),
            edited_message: None,
        }
    }

    #[tokio::test]
    async fn non_moderators_are_ignored_silently() {
        let (router, _store, platform) = setup(true).await;
        router.handle_update(command("/final https://example.com", 777)).await;
        assert_eq!(platform.reply_count(), 0);
    }

    #[tokio::test]
    async fn final_with_url_creates_a_direct_record() {
        let (router, store, platform) = setup(true).await;
        router
            .handle_update(command("/final https://example.com/page", MOD_ID))
            .await;

        let reply = platform.last_reply().unwrap();
        assert!(reply.starts_with("Final created\nhttps://t.me/gatekeeperbot/app?startapp=final_"));

        let final_token = reply.rsplit("startapp=").next().unwrap();
        let record = store.link_by_final(final_token).await.unwrap().unwrap();
        assert_eq!(record.access, LinkAccess::Direct);
        assert_eq!(
            record.destination,
            Destination::Url("https://example.com/page".to_string())
        );
        assert_eq!(record.owner_id, MOD_ID);
    }

    #[tokio::test]
    async fn final_with_entity_requires_admin_role() {
        let (router, store, platform) = setup(false).await;
        router
            .handle_update(command("/final -1001234567890", MOD_ID))
            .await;
        assert_eq!(
            platform.last_reply().as_deref(),
            Some("You must be an administrator of that entity")
        );
        assert_eq!(store.link_by_entity(-1001234567890).await.unwrap(), None);
    }

    #[tokio::test]
    async fn first_attaches_a_gate_exactly_once() {
        let (router, store, platform) = setup(true).await;
        router
            .handle_update(command("/final https://example.com/page", MOD_ID))
            .await;
        let final_token = platform
            .last_reply()
            .unwrap()
            .rsplit("startapp=")
            .next()
            .unwrap()
            .to_string();

        router
            .handle_update(command(
                &format!("/first {final_token} https://short.example/s"),
                MOD_ID,
            ))
            .await;
        let reply = platform.last_reply().unwrap();
        assert!(reply.starts_with("First created\n"));

        let record = store.link_by_final(&final_token).await.unwrap().unwrap();
        assert!(matches!(record.access, LinkAccess::Gated { .. }));

        router
            .handle_update(command(
                &format!("/first {final_token} https://short.example/other"),
                MOD_ID,
            ))
            .await;
        assert_eq!(platform.last_reply().as_deref(), Some("First already exists"));
    }

    #[tokio::test]
    async fn first_accepts_the_deep_link_form_of_the_final() {
        let (router, store, platform) = setup(true).await;
        router
            .handle_update(command("/final https://example.com/page", MOD_ID))
            .await;
        let deep_link = platform
            .last_reply()
            .unwrap()
            .lines()
            .last()
            .unwrap()
            .to_string();

        router
            .handle_update(command(
                &format!("/first {deep_link} https://short.example/s"),
                MOD_ID,
            ))
            .await;
        assert!(platform.last_reply().unwrap().starts_with("First created\n"));

        let final_token = deep_link.rsplit("startapp=").next().unwrap();
        let record = store.link_by_final(final_token).await.unwrap().unwrap();
        assert!(matches!(record.access, LinkAccess::Gated { .. }));
    }

    #[tokio::test]
    async fn delete_normalizes_the_deep_link_form() {
        let (router, store, platform) = setup(true).await;
        router
            .handle_update(command("/final https://example.com/page", MOD_ID))
            .await;
        let deep_link = platform
            .last_reply()
            .unwrap()
            .lines()
            .last()
            .unwrap()
            .to_string();
        let final_token = deep_link.rsplit("startapp=").next().unwrap().to_string();

        router
            .handle_update(command(&format!("/delete {deep_link}"), MOD_ID))
            .await;
        assert_eq!(platform.last_reply().as_deref(), Some("Deleted"));
        assert_eq!(store.link_by_final(&final_token).await.unwrap(), None);

        router
            .handle_update(command("/delete final_nothing", MOD_ID))
            .await;
        assert_eq!(platform.last_reply().as_deref(), Some("Not found"));
    }

    #[tokio::test]
    async fn block_and_unblock_manage_the_list() {
        let (router, store, platform) = setup(true).await;

        router.handle_update(command("/block 777", MOD_ID)).await;
        assert!(store.is_blocked(777).await.unwrap());

        router.handle_update(command("/blocklist", MOD_ID)).await;
        assert_eq!(platform.last_reply().as_deref(), Some("777"));

        router.handle_update(command("/unblock 777", MOD_ID)).await;
        assert!(!store.is_blocked(777).await.unwrap());

        router.handle_update(command("/blocklist", MOD_ID)).await;
        assert_eq!(platform.last_reply().as_deref(), Some("Blocklist is empty"));
    }

    #[tokio::test]
    async fn blocking_a_moderator_is_a_noop_with_the_same_reply() {
        let (router, store, platform) = setup(true).await;
        router
            .handle_update(command(&format!("/block {MOD_ID}"), MOD_ID))
            .await;
        assert_eq!(
            platform.last_reply().as_deref(),
            Some(format!("Blocked {MOD_ID}").as_str())
        );
        assert!(!store.is_blocked(MOD_ID).await.unwrap());
    }

    #[tokio::test]
    async fn blocked_users_are_dropped_before_dispatch() {
        let (router, store, platform) = setup(true).await;
        store.block(901).await.unwrap();
        store.add_moderator(901).await.unwrap();

        router.handle_update(command("/start", 901)).await;
        assert_eq!(platform.reply_count(), 0);
    }
}
