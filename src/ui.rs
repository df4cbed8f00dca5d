use iocraft::prelude::*;
use tokio::sync::watch;

use amlak::rest_types::{Category, DealKind, Estate, EstateRequest, Reminder};

const BAR_WIDTH: usize = 30;

/// Rounds to whole Toman and inserts thousands separators; all rounding in
/// the tool happens here, at display time.
pub fn format_toman(amount: f64) -> String {
    let rounded = amount.round() as i64;
    let digits = rounded.abs().to_string();
    let mut grouped = String::new();
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    if rounded < 0 {
        format!("-{}", grouped)
    } else {
        grouped
    }
}

fn format_time(timestamp: std::time::SystemTime) -> String {
    humantime::format_rfc3339_seconds(timestamp).to_string()
}

fn price_summary(estate: &Estate) -> String {
    match estate.deal_kind {
        DealKind::Sale => format!(
            "{} Toman",
            estate.price.map(format_toman).unwrap_or("?".to_string())
        ),
        DealKind::Rent => format!(
            "rahn {} / ejareh {}",
            estate.deposit.map(format_toman).unwrap_or("?".to_string()),
            estate
                .monthly_rent
                .map(format_toman)
                .unwrap_or("?".to_string())
        ),
    }
}

#[derive(Default, Props)]
pub struct EstateListProps {
    pub estates: Vec<Estate>,
}

#[component]
pub fn EstateList(props: &EstateListProps) -> impl Into<AnyElement<'static>> {
    element! {
        View(flex_direction: FlexDirection::Column) {
            #(props.estates.iter().map(|estate| {
                element! {
                    View(flex_direction: FlexDirection::Row) {
                        Text(weight: Weight::Bold, content: format!("{}  ", estate.title))
                        Text(content: format!("{} | {} | {}", estate.city, estate.deal_kind, price_summary(estate)))
                    }
                }
            }))
        }
    }
}

#[derive(Default, Props)]
pub struct EstateDetailProps {
    pub estate: Option<Estate>,
}

#[component]
pub fn EstateDetail(props: &EstateDetailProps) -> impl Into<AnyElement<'static>> {
    let estate = props.estate.as_ref().expect("EstateDetail requires an estate");
    let district = estate.district.clone().unwrap_or("-".to_string());
    let area = estate
        .area
        .map(|area| format!("{} m²", area))
        .unwrap_or("-".to_string());
    let rooms = estate
        .rooms
        .map(|rooms| rooms.to_string())
        .unwrap_or("-".to_string());

    element! {
        View(flex_direction: FlexDirection::Column) {
            View(flex_direction: FlexDirection::Row) {
                Text(content: "┌ ")
                View(background_color: Color::Blue) {
                    Text(content: estate.title.clone(), color: Color::White)
                }
            }
            Text(content: format!("│ {} ({}), {}", estate.city, district, estate.category))
            Text(content: format!("│ {}", price_summary(estate)))
            Text(content: format!("│ area: {}, rooms: {}", area, rooms))
            Text(content: format!("└ listed {}", format_time(estate.created_at.0)))
        }
    }
}

#[derive(Default, Props)]
pub struct CategoryListProps {
    pub categories: Vec<Category>,
}

#[component]
pub fn CategoryList(props: &CategoryListProps) -> impl Into<AnyElement<'static>> {
    element! {
        View(flex_direction: FlexDirection::Column) {
            #(props.categories.iter().map(|category| {
                element! {
                    Text(content: format!("{} ({})", category.name, category.slug))
                }
            }))
        }
    }
}

#[derive(Default, Props)]
pub struct ReminderListProps {
    pub reminders: Vec<Reminder>,
}

#[component]
pub fn ReminderList(props: &ReminderListProps) -> impl Into<AnyElement<'static>> {
    element! {
        View(flex_direction: FlexDirection::Column) {
            #(props.reminders.iter().map(|reminder| {
                let marker = if reminder.done { "◆" } else { "◇" };
                element! {
                    Text(content: format!("{} {} (due {})", marker, reminder.title, format_time(reminder.due_at.0)))
                }
            }))
        }
    }
}

#[derive(Default, Props)]
pub struct RequestListProps {
    pub requests: Vec<EstateRequest>,
}

#[component]
pub fn RequestList(props: &RequestListProps) -> impl Into<AnyElement<'static>> {
    element! {
        View(flex_direction: FlexDirection::Column) {
            #(props.requests.iter().map(|request| {
                let description = request.description.clone().unwrap_or("-".to_string());
                element! {
                    View(flex_direction: FlexDirection::Row) {
                        Text(weight: Weight::Bold, content: format!("{}  ", request.phone))
                        Text(content: format!("{} | {} | {}", request.status, description, format_time(request.created_at.0)))
                    }
                }
            }))
        }
    }
}

#[derive(Default, Props)]
pub struct CommissionBreakdownProps {
    pub title: String,
    pub rows: Vec<(String, String)>,
}

#[component]
pub fn CommissionBreakdown(props: &CommissionBreakdownProps) -> impl Into<AnyElement<'static>> {
    element! {
        View(flex_direction: FlexDirection::Column) {
            View(flex_direction: FlexDirection::Row) {
                Text(content: "┌ ")
                View(background_color: Color::Blue) {
                    Text(content: props.title.clone(), color: Color::White)
                }
            }
            #(props.rows.iter().map(|(label, value)| {
                element! {
                    Text(content: format!("│ {:<24} {} Toman", label, value))
                }
            }))
            Text(content: "└")
        }
    }
}

#[derive(Default, Props)]
pub struct ProgressBarProps {
    pub title: String,
    pub progress: Option<watch::Receiver<f32>>,
}

#[component]
pub fn ProgressBar(props: &ProgressBarProps, mut hooks: Hooks) -> impl Into<AnyElement<'static>> {
    let mut percent = hooks.use_state(|| 0.0f32);
    let receiver = props.progress.clone();

    hooks.use_future(async move {
        if let Some(mut receiver) = receiver {
            while receiver.changed().await.is_ok() {
                let value = *receiver.borrow();
                percent.set(value);
            }
        }
    });

    let value = percent.get().clamp(0.0, 100.0);
    let filled = (value / 100.0 * BAR_WIDTH as f32) as usize;
    let empty = BAR_WIDTH - filled;

    element! {
        View(flex_direction: FlexDirection::Row) {
            #((value < 100.0).then(|| element! { Spinner() }))
            #((value >= 100.0).then(|| element! { Text(color: Color::Green, content: "◆") }))
            Text(weight: Weight::Bold, content: format!(" {} ", props.title))
            Text(content: format!("[{}{}] {:>3.0}%", "█".repeat(filled), "░".repeat(empty), value))
        }
    }
}

const SPINNER_FRAMES: [&str; 6] = ["⠋", "⠙", "⠸", "⠴", "⠦", "⠇"];

#[component]
pub fn Spinner(mut hooks: Hooks) -> impl Into<AnyElement<'static>> {
    let mut frame = hooks.use_state(|| 0usize);

    hooks.use_future(async move {
        loop {
            tokio::time::sleep(tokio::time::Duration::from_millis(120)).await;
            frame.set((frame.get() + 1) % SPINNER_FRAMES.len());
        }
    });

    element! {
        Text(content: SPINNER_FRAMES[frame.get()], color: Color::Cyan)
    }
}

#[derive(Default, Props)]
pub struct ErrorMessageProps {
    pub message: String,
}

#[component]
pub fn ErrorMessage(props: &ErrorMessageProps) -> impl Into<AnyElement<'static>> {
    element! {
        View(flex_direction: FlexDirection::Row) {
            Text(color: Color::Red, content: "▲ ")
            Text(content: props.message.clone())
        }
    }
}

#[derive(Default, Props)]
pub struct SuccessMessageProps {
    pub message: String,
}

#[component]
pub fn SuccessMessage(props: &SuccessMessageProps) -> impl Into<AnyElement<'static>> {
    element! {
        View(flex_direction: FlexDirection::Row) {
            Text(color: Color::Green, content: "◆ ")
            Text(content: props.message.clone())
        }
    }
}

#[derive(Default, Props)]
pub struct InputPromptProps {
    pub prompt: String,
    pub default: Option<String>,
    pub description: Option<String>,
}

#[component]
pub fn InputPrompt(props: &InputPromptProps) -> impl Into<AnyElement<'static>> {
    let prompt = match &props.default {
        Some(default) => format!("{} [{}]", props.prompt, default),
        None => props.prompt.clone(),
    };

    element! {
        View(flex_direction: FlexDirection::Column) {
            Text(weight: Weight::Bold, content: prompt)
            #(props.description.as_ref().map(|description| element! {
                Text(color: Color::DarkGrey, content: description.clone())
            }))
        }
    }
}

#[component]
pub fn ConfigHeader() -> impl Into<AnyElement<'static>> {
    element! {
        View(flex_direction: FlexDirection::Row) {
            View(background_color: Color::Blue) {
                Text(content: " amlak configuration ", color: Color::White)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_toman_groups_thousands() {
        assert_eq!(format_toman(0.0), "0");
        assert_eq!(format_toman(999.0), "999");
        assert_eq!(format_toman(1000.0), "1,000");
        assert_eq!(format_toman(3_500_000.0), "3,500,000");
        assert_eq!(format_toman(700_000_000.0), "700,000,000");
    }

    #[test]
    fn test_format_toman_rounds_at_display_time() {
        assert_eq!(format_toman(1_099.5), "1,100");
        assert_eq!(format_toman(3_500_000.0025), "3,500,000");
    }

    #[test]
    fn test_format_toman_negative() {
        assert_eq!(format_toman(-1234.0), "-1,234");
    }
}
