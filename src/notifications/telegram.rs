use async_trait::async_trait;
use log::debug;
use teloxide::payloads::SendMessageSetters;
use teloxide::prelude::Requester;
use teloxide::types::{ChatId, ParseMode, Recipient};
use teloxide::utils::{html, markdown};
use teloxide::Bot;

use crate::config::{MessageFormat, TelegramConfig};
use crate::error::NotificationError;
use crate::models::{Direction, NotificationPayload};

use super::{truncate_address, NotificationSink};

/// Sends one Telegram message per payload through the Bot API
pub struct TelegramNotifier {
    bot: Bot,
    recipient: Recipient,
    format: MessageFormat,
}

impl TelegramNotifier {
    pub fn new(config: &TelegramConfig) -> Result<Self, NotificationError> {
        Ok(Self {
            bot: Bot::new(config.bot_token.trim()),
            recipient: parse_recipient(&config.chat_id)?,
            format: config.message_format,
        })
    }

    pub fn render(&self, payload: &NotificationPayload) -> String {
        render_message(payload, self.format)
    }
}

#[async_trait]
impl NotificationSink for TelegramNotifier {
    async fn send(&self, payload: &NotificationPayload) -> Result<(), NotificationError> {
        let parse_mode = match self.format {
            MessageFormat::Markdown => ParseMode::MarkdownV2,
            MessageFormat::Html => ParseMode::Html,
        };

        self.bot
            .send_message(self.recipient.clone(), self.render(payload))
            .parse_mode(parse_mode)
            .disable_web_page_preview(true)
            .await
            .map_err(|e| NotificationError::Telegram(e.to_string()))?;

        debug!("Telegram notification sent for {}", payload.transaction.hash);
        Ok(())
    }
}

/// Numeric ids (users, groups, `-100…` channels) or `@channel` names
pub fn parse_recipient(chat_id: &str) -> Result<Recipient, NotificationError> {
    let chat_id = chat_id.trim();
    if let Ok(id) = chat_id.parse::<i64>() {
        return Ok(Recipient::Id(ChatId(id)));
    }
    if chat_id.len() > 1 && chat_id.starts_with('@') {
        return Ok(Recipient::ChannelUsername(chat_id.to_string()));
    }
    Err(NotificationError::InvalidChat(chat_id.to_string()))
}

pub fn render_message(payload: &NotificationPayload, format: MessageFormat) -> String {
    let tx = &payload.transaction;
    let (emoji, action) = match tx.direction {
        Direction::Incoming => ("📥", "Received"),
        Direction::Outgoing => ("📤", "Sent"),
    };
    let (party_label, party) = match tx.direction {
        Direction::Incoming => ("From", truncate_address(&tx.from)),
        Direction::Outgoing => ("To", truncate_address(&tx.to)),
    };
    let chain = tx.chain.display_name();
    let wallet = payload.wallet.display_name();

    let mut lines = Vec::with_capacity(9);
    match format {
        MessageFormat::Markdown => {
            lines.push(format!("{} *{} on {}*", emoji, action, markdown::escape(chain)));
            lines.push(String::new());
            lines.push(format!("💼 *Wallet:* {}", markdown::escape(wallet)));
            lines.push(format!("💰 *Amount:* {}", markdown::escape(&tx.value_formatted)));
            lines.push(String::new());
            lines.push(format!("👤 *{}:* `{}`", party_label, markdown::escape_code(&party)));
            if let Some(balance) = &payload.balance {
                lines.push(format!("📊 *Balance:* {}", markdown::escape(balance)));
            }
            lines.push(String::new());
            lines.push(format!("[View Transaction]({})", markdown::escape_link_url(&tx.explorer_url)));
        }
        MessageFormat::Html => {
            lines.push(format!("{} <b>{} on {}</b>", emoji, action, chain));
            lines.push(String::new());
            lines.push(format!("💼 <b>Wallet:</b> {}", html::escape(wallet)));
            lines.push(format!("💰 <b>Amount:</b> {}", html::escape(&tx.value_formatted)));
            lines.push(String::new());
            lines.push(format!("👤 <b>{}:</b> <code>{}</code>", party_label, html::escape(&party)));
            if let Some(balance) = &payload.balance {
                lines.push(format!("📊 <b>Balance:</b> {}", html::escape(balance)));
            }
            lines.push(String::new());
            lines.push(format!(
                "<a href=\"{}\">View Transaction</a>",
                html::escape(&tx.explorer_url)
            ));
        }
    }
    lines.join("\n")
}
