//! Sampling against the real OS process table.

use system_pulse::config::Config;

#[tokio::test]
async fn test_live_dashboard_is_ranked() {
    let service = system_pulse::build_service(&Config::default());
    let page = service.get_dashboard_page(1).await;

    assert!(page.total_items > 0, "expected at least this test process");
    assert!(page.items.len() <= 20);
    for pair in page.items.windows(2) {
        assert!(pair[0].relevance_score >= pair[1].relevance_score);
    }
}

#[tokio::test]
async fn test_live_self_monitor_and_details() {
    let service = system_pulse::build_service(&Config::default());

    let report = service.self_monitor().await;
    assert!(report.memory_mb > 0.0);

    let me = std::process::id();
    let lookup = service.process_details(me).await;
    assert!(lookup.found);
    assert_eq!(lookup.details.unwrap().pid, me);
}

#[tokio::test]
async fn test_live_process_search_is_sorted() {
    let service = system_pulse::build_service(&Config::default());
    let names: Vec<String> = service
        .process_search()
        .await
        .processes
        .into_iter()
        .map(|p| p.name.to_lowercase())
        .collect();

    assert!(!names.is_empty());
    let mut sorted = names.clone();
    sorted.sort();
    assert_eq!(names, sorted);
}
