use super::*;
use chrono::TimeZone;

fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 12, 20, 12, 0, 0)
        .single()
        .expect("valid timestamp")
}

fn create_test_record(
    id: i64,
    title: &str,
    category: Category,
    priority: Priority,
    status: Status,
    days_ago: i64,
) -> Record {
    Record {
        id,
        title: title.to_string(),
        description: String::new(),
        category,
        priority,
        status,
        created_at: fixed_now() - Duration::days(days_ago),
        embedding: Vec::new(),
    }
}

#[test]
fn empty_results_report_no_matches() {
    let summary = ResponseSynthesizer::default().summarize_at("anything", &[], fixed_now());
    assert_eq!(summary, NO_MATCHES);
}

#[test]
fn full_summary_layout() {
    let records = [
        create_test_record(1, "Card declined", Category::Payment, Priority::High, Status::Open, 1),
        create_test_record(2, "Refund missing", Category::Payment, Priority::Low, Status::Closed, 10),
        create_test_record(3, "Cannot log in", Category::Login, Priority::High, Status::Open, 0),
    ];
    let refs: Vec<&Record> = records.iter().collect();

    let summary = ResponseSynthesizer::default().summarize_at("payment", &refs, fixed_now());
    assert_eq!(
        summary,
        "Found 3 tickets for \"payment\". Insights: 2 high priority, 2 open, mostly Payment (2). Recent: Card declined; Cannot log in."
    );
}

#[test]
fn single_record_without_insights() {
    let records = [create_test_record(
        1,
        "Old shipping delay",
        Category::Shipping,
        Priority::Low,
        Status::Resolved,
        30,
    )];
    let refs: Vec<&Record> = records.iter().collect();

    let summary = ResponseSynthesizer::default().summarize_at("delay", &refs, fixed_now());
    assert_eq!(summary, "Found 1 ticket for \"delay\".");
}

#[test]
fn category_reported_only_when_repeated() {
    let records = [
        create_test_record(1, "a", Category::Payment, Priority::Low, Status::Closed, 30),
        create_test_record(2, "b", Category::Login, Priority::Low, Status::Closed, 30),
    ];
    let refs: Vec<&Record> = records.iter().collect();

    let summary = ResponseSynthesizer::default().summarize_at("q", &refs, fixed_now());
    assert!(!summary.contains("mostly"));
}

#[test]
fn category_tie_goes_to_first_encountered() {
    let records = [
        create_test_record(1, "a", Category::Order, Priority::Low, Status::Closed, 30),
        create_test_record(2, "b", Category::Login, Priority::Low, Status::Closed, 30),
        create_test_record(3, "c", Category::Login, Priority::Low, Status::Closed, 30),
        create_test_record(4, "d", Category::Order, Priority::Low, Status::Closed, 30),
    ];
    let refs: Vec<&Record> = records.iter().collect();

    let summary = ResponseSynthesizer::default().summarize_at("q", &refs, fixed_now());
    assert!(summary.contains("mostly Order (2)"), "{}", summary);
}

#[test]
fn recent_titles_are_truncated() {
    let long_title = "An extremely long ticket title that keeps going";
    let records = [create_test_record(
        1,
        long_title,
        Category::Order,
        Priority::Medium,
        Status::Closed,
        0,
    )];
    let refs: Vec<&Record> = records.iter().collect();

    let summary = ResponseSynthesizer::default().summarize_at("q", &refs, fixed_now());
    let expected: String = long_title.chars().take(30).collect();
    assert!(summary.ends_with(&format!(" Recent: {}.", expected)), "{}", summary);
}

#[test]
fn recent_clause_only_scans_first_five() {
    let mut records: Vec<Record> = (1..=5)
        .map(|id| create_test_record(id, "old", Category::Order, Priority::Low, Status::Closed, 30))
        .collect();
    records.push(create_test_record(6, "fresh", Category::Order, Priority::Low, Status::Closed, 0));
    let refs: Vec<&Record> = records.iter().collect();

    let summary = ResponseSynthesizer::default().summarize_at("q", &refs, fixed_now());
    assert!(!summary.contains("Recent"), "{}", summary);
}

#[test]
fn custom_window_and_preview() {
    let records = [create_test_record(
        1,
        "Checkout broken",
        Category::Order,
        Priority::Low,
        Status::Closed,
        5,
    )];
    let refs: Vec<&Record> = records.iter().collect();

    let summary = ResponseSynthesizer::new(7, 8).summarize_at("q", &refs, fixed_now());
    assert!(summary.ends_with(" Recent: Checkout."), "{}", summary);
}

#[test]
fn summaries_are_deterministic() {
    let records = [
        create_test_record(1, "x", Category::Payment, Priority::High, Status::Open, 1),
        create_test_record(2, "y", Category::Payment, Priority::High, Status::Open, 1),
    ];
    let refs: Vec<&Record> = records.iter().collect();
    let synthesizer = ResponseSynthesizer::default();

    assert_eq!(
        synthesizer.summarize_at("q", &refs, fixed_now()),
        synthesizer.summarize_at("q", &refs, fixed_now())
    );
}

#[test]
fn recent_clause_without_insights() {
    let records = [create_test_record(
        1,
        "Address change",
        Category::Other("Account".to_string()),
        Priority::Low,
        Status::Closed,
        1,
    )];
    let refs: Vec<&Record> = records.iter().collect();

    let summary = ResponseSynthesizer::default().summarize_at("address", &refs, fixed_now());
    assert_eq!(summary, "Found 1 ticket for \"address\". Recent: Address change.");
}
