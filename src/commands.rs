//! Routing of incoming chat text and button callbacks.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topic {
    Design,
    Ux,
    Ui,
    Tools,
    General,
}

impl Topic {
    fn from_command(command: &str) -> Option<Self> {
        match command {
            "/design" => Some(Topic::Design),
            "/ux" => Some(Topic::Ux),
            "/ui" => Some(Topic::Ui),
            "/tools" => Some(Topic::Tools),
            "/ask" => Some(Topic::General),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Topic::Design => "design",
            Topic::Ux => "ux",
            Topic::Ui => "ui",
            Topic::Tools => "tools",
            Topic::General => "general",
        }
    }

    /// Framing prepended to the question before it reaches the model.
    pub fn context_prefix(self) -> &'static str {
        match self {
            Topic::Design => "About design principles and theory: ",
            Topic::Ux => "About user experience and research: ",
            Topic::Ui => "About interfaces and UI patterns: ",
            Topic::Tools => "About design tools: ",
            Topic::General => "",
        }
    }

    pub fn progress_notice(self) -> &'static str {
        match self {
            Topic::Design => "🎨 Analysing design principles...",
            Topic::Ux => "👥 Checking UX best practices...",
            Topic::Ui => "🖼️ Reviewing interface patterns...",
            Topic::Tools => "🛠️ Looking up tool guides...",
            Topic::General => "💭 Working on your design question...",
        }
    }

    pub fn usage(self) -> &'static str {
        match self {
            Topic::Design => "❌ Usage: /design <your design question>\n\nExample: /design principles of visual hierarchy",
            Topic::Ux => "❌ Usage: /ux <your UX question>\n\nExample: /ux how to run effective user research",
            Topic::Ui => "❌ Usage: /ui <your UI question>\n\nExample: /ui best practices for buttons",
            Topic::Tools => "❌ Usage: /tools <your tools question>\n\nExample: /tools how to use components in Figma",
            Topic::General => "❌ Usage: /ask <your question>\n\nExample: /ask difference between UX and UI",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    UxResearch,
    UiPatterns,
    DesignSystems,
    CaseStudies,
    ToolsGuides,
    Accessibility,
    Prototyping,
    UserTesting,
}

impl Category {
    pub const ALL: [Category; 8] = [
        Category::UxResearch,
        Category::UiPatterns,
        Category::DesignSystems,
        Category::CaseStudies,
        Category::ToolsGuides,
        Category::Accessibility,
        Category::Prototyping,
        Category::UserTesting,
    ];

    pub fn key(self) -> &'static str {
        match self {
            Category::UxResearch => "ux_research",
            Category::UiPatterns => "ui_patterns",
            Category::DesignSystems => "design_systems",
            Category::CaseStudies => "case_studies",
            Category::ToolsGuides => "tools_guides",
            Category::Accessibility => "accessibility",
            Category::Prototyping => "prototyping",
            Category::UserTesting => "user_testing",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|category| category.key() == key)
    }

    /// Folder under the documents directory.
    pub fn folder(self) -> &'static str {
        match self {
            Category::UxResearch => "UX_Research",
            Category::UiPatterns => "UI_Patterns",
            Category::DesignSystems => "Design_Systems",
            Category::CaseStudies => "Case_Studies",
            Category::ToolsGuides => "Tools_Guides",
            Category::Accessibility => "Accessibility",
            Category::Prototyping => "Prototyping",
            Category::UserTesting => "User_Testing",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Category::UxResearch => "UX Research",
            Category::UiPatterns => "UI Patterns",
            Category::DesignSystems => "Design Systems",
            Category::CaseStudies => "Case Studies",
            Category::ToolsGuides => "Tools",
            Category::Accessibility => "Accessibility",
            Category::Prototyping => "Prototyping",
            Category::UserTesting => "User Testing",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Category::UxResearch => "🎨 UX Research: research methods, personas, journey mapping",
            Category::UiPatterns => "🖼️ UI Patterns: components, interface patterns, design tokens",
            Category::DesignSystems => "🎯 Design Systems: style guides and reusable components",
            Category::CaseStudies => "📱 Case Studies: real projects and design critiques",
            Category::ToolsGuides => "🛠️ Tools: Figma, Sketch, Adobe XD, prototyping",
            Category::Accessibility => "♿ Accessibility: WCAG, inclusive design, good practice",
            Category::Prototyping => "🧪 Prototyping: fidelity levels and prototyping workflows",
            Category::UserTesting => "🔬 User Testing: usability tests and their analysis",
        }
    }

    fn keyboard_label(self) -> Option<&'static str> {
        match self {
            Category::UxResearch => Some("🎨 UX Research"),
            Category::UiPatterns => Some("🖼️ UI Patterns"),
            Category::DesignSystems => Some("🎯 Design Systems"),
            Category::CaseStudies => Some("📱 Case Studies"),
            Category::ToolsGuides => Some("🛠️ Tools"),
            Category::Accessibility => Some("♿ Accessibility"),
            Category::Prototyping | Category::UserTesting => None,
        }
    }
}

pub const SEARCH_BUTTON: &str = "🔍 Search";
pub const HELP_BUTTON: &str = "❓ Help";

/// Rows of the persistent reply keyboard shown by /start.
pub fn main_keyboard_rows() -> Vec<Vec<&'static str>> {
    vec![
        vec!["🎨 UX Research", "🖼️ UI Patterns"],
        vec!["🎯 Design Systems", "📱 Case Studies"],
        vec![SEARCH_BUTTON, HELP_BUTTON],
        vec!["🛠️ Tools", "♿ Accessibility"],
    ]
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    Ask { topic: Topic, question: String },
    Search { question: String },
    Usage(Topic),
    SearchUsage,
    SearchHelp,
    Browse(Category),
    Menu,
}

pub fn parse_message(text: &str) -> Command {
    let text = text.trim();

    if text.starts_with('/') {
        let (head, rest) = text
            .split_once(char::is_whitespace)
            .unwrap_or((text, ""));
        // "/ux@DesignBot" in group chats
        let command = head.split('@').next().unwrap_or(head).to_ascii_lowercase();
        let question = rest.trim().to_string();

        return match command.as_str() {
            "/start" => Command::Start,
            "/help" => Command::Help,
            "/search" if question.is_empty() => Command::SearchUsage,
            "/search" => Command::Search { question },
            other => match Topic::from_command(other) {
                Some(topic) if question.is_empty() => Command::Usage(topic),
                Some(topic) => Command::Ask { topic, question },
                None => Command::Help,
            },
        };
    }

    let lower = text.to_lowercase();
    for category in Category::ALL {
        let Some(label) = category.keyboard_label() else {
            continue;
        };
        let label = label.to_lowercase();
        let bare = label
            .split_once(' ')
            .map(|(_, name)| name.to_string())
            .unwrap_or_else(|| label.clone());
        if lower == label || lower == bare {
            return Command::Browse(category);
        }
    }

    match lower.as_str() {
        "" => Command::Menu,
        "🔍 search" | "search" => Command::SearchHelp,
        "❓ help" | "help" => Command::Help,
        _ => Command::Ask {
            topic: Topic::General,
            question: text.to_string(),
        },
    }
}

pub const DOWNLOAD_PREFIX: &str = "download#";
pub const LIST_PREFIX: &str = "list_";
pub const BACK_MAIN: &str = "back_main";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackAction {
    Download(String),
    List(Category),
    UnknownCategory(String),
    BackToHelp,
    BackToStart,
}

pub fn parse_callback(data: &str) -> CallbackAction {
    if let Some(path) = data.strip_prefix(DOWNLOAD_PREFIX) {
        return CallbackAction::Download(path.to_string());
    }
    if let Some(key) = data.strip_prefix(LIST_PREFIX) {
        return match Category::from_key(key) {
            Some(category) => CallbackAction::List(category),
            None => CallbackAction::UnknownCategory(key.to_string()),
        };
    }
    if data == BACK_MAIN {
        CallbackAction::BackToHelp
    } else {
        CallbackAction::BackToStart
    }
}

pub fn download_callback(relative_path: &str) -> String {
    format!("{DOWNLOAD_PREFIX}{relative_path}")
}

pub fn list_callback(category: Category) -> String {
    format!("{LIST_PREFIX}{}", category.key())
}
