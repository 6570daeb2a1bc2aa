//! Inline menu model: layouts and callback data.
//!
//! Kept free of Telegram types; the adapter converts [`InlineKeyboard`] into
//! its own markup.

/// Bot API limit for `callback_data`.
pub const MAX_CALLBACK_DATA_LEN: usize = 64;

const COLUMNS: usize = 2;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InlineButton {
    pub label: String,
    pub callback_data: String,
}

impl InlineButton {
    fn new(label: impl Into<String>, action: &MenuAction) -> Self {
        Self {
            label: label.into(),
            callback_data: action.to_callback_data(),
        }
    }
}

/// Inline keyboard, row by row.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InlineKeyboard {
    pub rows: Vec<Vec<InlineButton>>,
}

/// What a menu button asks the bot to do.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MenuAction {
    Category(String),
    Function { category: String, function: String },
    Broadcast,
    BackToMain,
    CloseMenu,
}

impl MenuAction {
    pub fn parse(data: &str) -> Option<Self> {
        match data {
            "broadcast_message" => return Some(Self::Broadcast),
            "back_to_main" => return Some(Self::BackToMain),
            "close_menu" => return Some(Self::CloseMenu),
            _ => {}
        }

        let mut parts = data.split('|');
        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some("category"), Some(c), None, None) if !c.is_empty() => {
                Some(Self::Category(c.to_string()))
            }
            (Some("function"), Some(c), Some(f), None) if !c.is_empty() && !f.is_empty() => {
                Some(Self::Function {
                    category: c.to_string(),
                    function: f.to_string(),
                })
            }
            _ => None,
        }
    }

    pub fn to_callback_data(&self) -> String {
        match self {
            Self::Category(c) => format!("category|{c}"),
            Self::Function { category, function } => format!("function|{category}|{function}"),
            Self::Broadcast => "broadcast_message".to_string(),
            Self::BackToMain => "back_to_main".to_string(),
            Self::CloseMenu => "close_menu".to_string(),
        }
    }
}

/// Top-level menu: categories two per row, then the broadcast entry (private
/// chats only) and a close button.
pub fn main_menu(categories: &[String], private_chat: bool) -> InlineKeyboard {
    let buttons = categories
        .iter()
        .map(|c| InlineButton::new(c.clone(), &MenuAction::Category(c.clone())));
    let mut rows = grid(buttons);

    if private_chat {
        rows.push(vec![InlineButton::new(
            "Broadcast Message",
            &MenuAction::Broadcast,
        )]);
    }
    rows.push(vec![InlineButton::new("Close Menu", &MenuAction::CloseMenu)]);
    InlineKeyboard { rows }
}

/// Functions of one category two per row, then Back / Close.
pub fn function_menu(category: &str, functions: &[String]) -> InlineKeyboard {
    let buttons = functions.iter().map(|f| {
        InlineButton::new(
            f.clone(),
            &MenuAction::Function {
                category: category.to_string(),
                function: f.clone(),
            },
        )
    });
    let mut rows = grid(buttons);
    rows.push(vec![
        InlineButton::new("Back", &MenuAction::BackToMain),
        InlineButton::new("Close Menu", &MenuAction::CloseMenu),
    ]);
    InlineKeyboard { rows }
}

fn grid(buttons: impl Iterator<Item = InlineButton>) -> Vec<Vec<InlineButton>> {
    let usable: Vec<InlineButton> = buttons
        .filter(|b| {
            let fits = b.callback_data.len() <= MAX_CALLBACK_DATA_LEN;
            if !fits {
                tracing::warn!(label = %b.label, "menu entry skipped, callback data too long");
            }
            fits
        })
        .collect();
    usable.chunks(COLUMNS).map(|row| row.to_vec()).collect()
}
