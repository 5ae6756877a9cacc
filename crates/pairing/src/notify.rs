//! Messages sent to the freshly paired account

use serde::Deserialize;

use crate::client::{LinkPreview, OutgoingMessage};

/// Branding shown in the confirmation message.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Branding {
    pub title: String,
    pub channel_url: String,
    pub repo_url: String,
    pub thumbnail_url: String,
    pub footer: String,
}

impl Default for Branding {
    fn default() -> Self {
        Self {
            title: "NAPPIER-XMD".into(),
            channel_url: "https://whatsapp.com/channel/0029Vb7PDezLdQefWzPPIq1Z".into(),
            repo_url: "https://github.com/micha-l-dev/NAPPIER-XMD".into(),
            thumbnail_url: "https://files.catbox.moe/25lh7r.png".into(),
            footer: "© Powered by Kathara".into(),
        }
    }
}

impl Branding {
    /// Human-readable confirmation sent right after the session string,
    /// with a large link preview pointing at the channel.
    pub fn confirmation(&self) -> OutgoingMessage {
        let text = format!(
            "👋🏻 *Hey there, {title} User!*\n\
             \n\
             ✅ Your session has been successfully created!\n\
             \n\
             🔐 *Session ID:* Sent above\n\
             ⚠️ *Keep it safe!* Do NOT share it with anyone.\n\
             \n\
             ———\n\
             *📢 Stay Updated:*\n\
             Join our official WhatsApp Channel\n\
             🔗 {channel}\n\
             \n\
             *💻 Source Code:*\n\
             GitHub Repository\n\
             🔗 {repo}\n\
             \n\
             ———\n\
             > *{footer}*\n\
             Stay cool and hack smart ✌🏻",
            title = self.title,
            channel = self.channel_url,
            repo = self.repo_url,
            footer = self.footer,
        );

        OutgoingMessage {
            text,
            preview: Some(LinkPreview {
                title: self.title.clone(),
                thumbnail_url: self.thumbnail_url.clone(),
                source_url: self.channel_url.clone(),
                render_large_thumbnail: true,
            }),
        }
    }
}

/// Best-effort notice sent when delivering the session failed.
pub fn error_notice(error: &str) -> OutgoingMessage {
    OutgoingMessage::text(format!("⚠️ Error: {error}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confirmation_mentions_links_and_title() {
        let branding = Branding {
            title: "TEST-BOT".into(),
            channel_url: "https://chan.example/c".into(),
            repo_url: "https://git.example/r".into(),
            thumbnail_url: "https://img.example/t.png".into(),
            footer: "© Test".into(),
        };
        let message = branding.confirmation();

        assert!(message.text.contains("Hey there, TEST-BOT User!"));
        assert!(message.text.contains("🔗 https://chan.example/c"));
        assert!(message.text.contains("🔗 https://git.example/r"));
        assert!(message.text.contains("> *© Test*"));

        let preview = message.preview.unwrap();
        assert_eq!(preview.title, "TEST-BOT");
        assert_eq!(preview.source_url, "https://chan.example/c");
        assert_eq!(preview.thumbnail_url, "https://img.example/t.png");
        assert!(preview.render_large_thumbnail);
    }

    #[test]
    fn branding_fills_missing_fields_from_defaults() {
        let branding: Branding = serde_json::from_str(r#"{"title":"OTHER"}"#).unwrap();
        assert_eq!(branding.title, "OTHER");
        assert_eq!(branding.repo_url, Branding::default().repo_url);
    }

    #[test]
    fn error_notice_carries_message() {
        let notice = error_notice("upload rejected (413)");
        assert_eq!(notice.text, "⚠️ Error: upload rejected (413)");
        assert!(notice.preview.is_none());
    }
}
