use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One turn of a conversation, in the shape the chat API expects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<String>>,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
            images: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            images: None,
        }
    }

    pub fn user_with_images(content: impl Into<String>, images: Vec<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            images: Some(images),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            images: None,
        }
    }
}

/// An in-memory conversation. Turns accumulate in order until `reset`.
#[derive(Debug, Clone, Default)]
pub struct Session {
    messages: Vec<Message>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.messages.push(Message::user(content));
    }

    pub fn push_user_with_images(&mut self, content: impl Into<String>, images: Vec<String>) {
        self.messages.push(Message::user_with_images(content, images));
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.messages.push(Message::assistant(content));
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn reset(&mut self) {
        self.messages.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn turns_accumulate_in_order() {
        let mut session = Session::new();
        session.push_user("first question");
        session.push_assistant("first answer");
        session.push_user("second question");

        let messages = session.messages();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[1].role, Role::Assistant);
        assert_eq!(messages[2].content, "second question");
    }

    #[test]
    fn reset_is_idempotent() {
        let mut session = Session::new();
        session.push_user("hello");
        session.reset();
        assert!(session.is_empty());
        session.reset();
        assert!(session.is_empty());
    }

    #[test]
    fn text_messages_omit_the_images_field() {
        let plain = serde_json::to_string(&Message::user("hi")).unwrap();
        assert!(!plain.contains("images"));

        let with_image =
            serde_json::to_string(&Message::user_with_images("hi", vec!["abc123".into()])).unwrap();
        assert!(with_image.contains("\"images\":[\"abc123\"]"));
        assert!(with_image.contains("\"role\":\"user\""));
    }
}
