use super::*;
use crate::db::models::VehicleAttributes;
use crate::db::DatabaseService;
use crate::ledger::Ledger;
use anyhow::Result;
use chrono::TimeZone;

struct Fixture {
    ledger: Ledger,
    query: ReportQuery,
}

async fn fixture() -> Result<Fixture> {
    let db = DatabaseService::in_memory().await?;
    Ok(Fixture {
        ledger: Ledger::new(db.pool.clone()),
        query: ReportQuery::new(db.pool, &ReportsConfig::default()),
    })
}

fn at(day: u32, hour: u32, min: u32, sec: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, day, hour, min, sec).unwrap()
}

fn attributes(vehicle_type: &str, color: &str, owner: &str, affiliation: &str) -> VehicleAttributes {
    VehicleAttributes {
        vehicle_type: vehicle_type.to_string(),
        color: color.to_string(),
        owner_name: owner.to_string(),
        owner_id: "0000".to_string(),
        affiliation: affiliation.to_string(),
        image_path: None,
    }
}

/// ABC123: closed 1st 10:00-12:30:15, open since 3rd 08:00
/// XYZ789: closed 2nd 09:00 - 3rd 11:00
async fn seed(ledger: &Ledger) -> Result<()> {
    ledger.record_sighting_at("ABC123", None, at(1, 10, 0, 0)).await?;
    ledger.record_sighting_at("ABC123", None, at(1, 12, 30, 15)).await?;
    ledger.record_sighting_at("XYZ789", None, at(2, 9, 0, 0)).await?;
    ledger.record_sighting_at("XYZ789", None, at(3, 11, 0, 0)).await?;
    ledger.record_sighting_at("ABC123", None, at(3, 8, 0, 0)).await?;
    Ok(())
}

#[test]
fn test_duration_formatting() {
    assert_eq!(
        format_duration(Some(Duration::hours(2) + Duration::minutes(30) + Duration::seconds(15))),
        "02:30:15"
    );
    assert_eq!(format_duration(Some(Duration::hours(26) + Duration::seconds(5))), "26:00:05");
    assert_eq!(format_duration(Some(Duration::zero())), "00:00:00");
    assert_eq!(format_duration(None), "N/A");
}

#[test]
fn test_paging() {
    let results: Vec<u32> = (1..=45).collect();

    let first = page(&results, 1, 20);
    assert_eq!(first.items, &results[0..20]);
    assert_eq!(first.total_pages, 3);
    assert_eq!(first.total_items, 45);

    let last = page(&results, 3, 20);
    assert_eq!(last.items, &[41, 42, 43, 44, 45]);

    assert!(page(&results, 4, 20).items.is_empty());
    assert!(page(&results, 0, 20).items.is_empty());

    let single = page(&results, 2, 0);
    assert_eq!(single.items, &[2]);
    assert_eq!(single.total_pages, 45);

    let empty: Vec<u32> = Vec::new();
    let nothing = page(&empty, 1, 20);
    assert!(nothing.items.is_empty());
    assert_eq!(nothing.total_pages, 0);
}

#[tokio::test]
async fn test_search_orders_by_entry_descending() -> Result<()> {
    let f = fixture().await?;
    seed(&f.ledger).await?;

    let results = f.query.search(&SearchFilter::default()).await?;
    let entries: Vec<_> = results.iter().map(|e| (e.plate.as_str(), e.entry_time)).collect();
    assert_eq!(
        entries,
        vec![
            ("ABC123", at(3, 8, 0, 0)),
            ("XYZ789", at(2, 9, 0, 0)),
            ("ABC123", at(1, 10, 0, 0)),
        ]
    );

    assert_eq!(results[0].duration_text(), "N/A");
    assert_eq!(results[1].duration_text(), "26:00:00");
    assert_eq!(results[2].duration_text(), "02:30:15");
    Ok(())
}

#[tokio::test]
async fn test_search_filters_combine() -> Result<()> {
    let f = fixture().await?;
    seed(&f.ledger).await?;

    let by_plate = f
        .query
        .search(&SearchFilter {
            plate: Some("abc-123".to_string()),
            ..SearchFilter::default()
        })
        .await?;
    assert_eq!(by_plate.len(), 2);
    assert!(by_plate.iter().all(|e| e.plate == "ABC123"));

    // Bounds are inclusive and apply to the entry time
    let in_range = f
        .query
        .search(&SearchFilter {
            plate: None,
            start: Some(at(1, 10, 0, 0)),
            end: Some(at(2, 9, 0, 0)),
        })
        .await?;
    assert_eq!(in_range.len(), 2);

    let combined = f
        .query
        .search(&SearchFilter {
            plate: Some("ABC123".to_string()),
            start: Some(at(2, 0, 0, 0)),
            end: None,
        })
        .await?;
    assert_eq!(combined.len(), 1);
    assert_eq!(combined[0].entry_time, at(3, 8, 0, 0));

    let blank_plate = f
        .query
        .search(&SearchFilter {
            plate: Some("  ".to_string()),
            ..SearchFilter::default()
        })
        .await?;
    assert_eq!(blank_plate.len(), 3);
    Ok(())
}

#[tokio::test]
async fn test_search_rejects_inverted_range() -> Result<()> {
    let f = fixture().await?;
    let err = f
        .query
        .search(&SearchFilter {
            plate: None,
            start: Some(at(5, 0, 0, 0)),
            end: Some(at(4, 0, 0, 0)),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ConstraintViolation(_)));
    Ok(())
}

#[tokio::test]
async fn test_export_csv() -> Result<()> {
    let f = fixture().await?;
    seed(&f.ledger).await?;
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("report.csv");

    let results = f.query.search(&SearchFilter::default()).await?;
    assert_eq!(f.query.export_csv(&results, &path).await?, 3);

    let contents = std::fs::read_to_string(&path)?;
    let lines: Vec<_> = contents.lines().collect();
    assert_eq!(
        lines,
        vec![
            "plate,entry_time,exit_time,duration",
            "ABC123,2024-01-03 08:00:00,N/A,N/A",
            "XYZ789,2024-01-02 09:00:00,2024-01-03 11:00:00,26:00:00",
            "ABC123,2024-01-01 10:00:00,2024-01-01 12:30:15,02:30:15",
        ]
    );
    Ok(())
}

#[tokio::test]
async fn test_export_vehicles_csv_quotes_fields() -> Result<()> {
    let f = fixture().await?;
    f.ledger
        .add_vehicle("KA01AB1234", attributes("Car", "Red", "Doe, \"JD\" John", "Staff"))
        .await?;
    f.ledger.record_sighting("MH12XY9999", None).await?;
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("vehicles.csv");

    let vehicles = f.ledger.list_vehicles().await?;
    assert_eq!(f.query.export_vehicles_csv(&vehicles, &path).await?, 2);

    let contents = std::fs::read_to_string(&path)?;
    let lines: Vec<_> = contents.lines().collect();
    assert_eq!(
        lines,
        vec![
            "plate,vehicle_type,color,owner_name,owner_id,affiliation,image_path",
            "KA01AB1234,Car,Red,\"Doe, \"\"JD\"\" John\",0000,Staff,",
            "MH12XY9999,Unknown,Unknown,Unknown,Unknown,Unknown,",
        ]
    );
    Ok(())
}

#[test]
fn test_csv_field() {
    assert_eq!(csv_field("plain"), "plain");
    assert_eq!(csv_field("a,b"), "\"a,b\"");
    assert_eq!(csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
}

#[tokio::test]
async fn test_search_vehicles_ranks_above_threshold() -> Result<()> {
    let f = fixture().await?;
    f.ledger
        .add_vehicle("ABC123", attributes("Sedan", "Silver", "Priya Nair", "Staff"))
        .await?;
    f.ledger
        .add_vehicle("ABC124", attributes("Truck", "Blue", "Omar Haddad", "Visitor"))
        .await?;
    f.ledger
        .add_vehicle("ZZZ999", attributes("Van", "Green", "Li Wei", "Contractor"))
        .await?;

    let results = f.query.search_vehicles("abc123").await?;
    let ranked: Vec<_> = results.iter().map(|r| r.vehicle.plate.as_str()).collect();
    assert_eq!(ranked, vec!["ABC123", "ABC124"]);
    assert_eq!(results[0].score, 100.0);
    assert!(results[1].score >= 70.0 && results[1].score < 100.0);

    // Matches on any attribute, not just the plate
    let by_owner = f.query.search_vehicles("Priya Nayr").await?;
    assert_eq!(by_owner.len(), 1);
    assert_eq!(by_owner[0].vehicle.plate, "ABC123");

    assert!(f.query.search_vehicles("qqqqqq").await?.is_empty());
    assert_eq!(f.query.search_vehicles("   ").await?.len(), 3);
    Ok(())
}

#[tokio::test]
async fn test_search_vehicles_threshold_is_configurable() -> Result<()> {
    let db = DatabaseService::in_memory().await?;
    let ledger = Ledger::new(db.pool.clone());
    let strict = ReportQuery::new(
        db.pool,
        &ReportsConfig {
            similarity_threshold: 100.0,
            ..ReportsConfig::default()
        },
    );
    ledger
        .add_vehicle("ABC123", VehicleAttributes::default())
        .await?;
    ledger
        .add_vehicle("ABC124", VehicleAttributes::default())
        .await?;

    let results = strict.search_vehicles("ABC123").await?;
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].vehicle.plate, "ABC123");
    Ok(())
}
