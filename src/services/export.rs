use std::collections::HashSet;

use base64::Engine;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rusqlite::Connection;

use crate::db::queries;
use crate::services::storage::{data_url_to_bytes, ArchiveSink, ObjectStorage};

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("{0} booking(s) are missing identification documents")]
    MissingDocuments(usize),

    #[error("invalid date: {0}")]
    BadDate(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// One row of the police-verification export: the primary guest of a booking
/// plus the count of accompanying guests.
#[derive(Debug, Clone)]
pub struct GuestStayRecord {
    pub booking_id: String,
    pub room_number: String,
    pub check_in: NaiveDateTime,
    pub check_out: NaiveDateTime,
    pub guest_name: String,
    pub phone: String,
    pub id_type: String,
    pub id_number: String,
    pub address: Option<String>,
    pub id_front_image: Option<String>,
    pub id_back_image: Option<String>,
    pub additional_guests: usize,
}

impl GuestStayRecord {
    pub fn has_complete_id(&self) -> bool {
        self.id_front_image.is_some() && self.id_back_image.is_some()
    }
}

pub struct ArchiveSummary {
    pub entries: usize,
    pub skipped: usize,
    pub location: String,
}

pub fn parse_export_date(raw: &str) -> Result<NaiveDate, ExportError> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| ExportError::BadDate(raw.to_string()))
}

/// Pulls the export set: bookings whose check-in falls inside the day range
/// and whose id was selected. Bookings without a primary guest are skipped.
pub fn collect_records(
    conn: &Connection,
    start: NaiveDate,
    end: NaiveDate,
    selected: &[String],
) -> Result<Vec<GuestStayRecord>, ExportError> {
    let range_start = start.and_time(NaiveTime::MIN);
    let range_end = end
        .and_hms_opt(23, 59, 59)
        .unwrap_or_else(|| end.and_time(NaiveTime::MIN));

    let selected: HashSet<&str> = selected.iter().map(String::as_str).collect();
    let bookings = queries::get_bookings_checked_in_range(conn, &range_start, &range_end)?;

    let mut records = vec![];
    for booking in bookings {
        if !selected.contains(booking.id.as_str()) {
            continue;
        }
        let Some(primary) = queries::get_primary_guest(conn, &booking.id)? else {
            continue;
        };
        let guest_count = queries::get_guests_for_booking(conn, &booking.id)?.len();
        let room_number = queries::get_room(conn, &booking.room_id)?
            .map(|r| r.room_number)
            .unwrap_or_else(|| "N/A".to_string());

        records.push(GuestStayRecord {
            booking_id: booking.id.clone(),
            room_number,
            check_in: booking.check_in,
            check_out: booking.check_out.unwrap_or(booking.expected_checkout),
            guest_name: primary.full_name,
            phone: primary
                .phone
                .or(primary.phone_number)
                .unwrap_or_else(|| "N/A".to_string()),
            id_type: primary
                .id_proof_type
                .map(|t| t.label())
                .unwrap_or_else(|| "N/A".to_string()),
            id_number: primary.id_proof_number.unwrap_or_else(|| "N/A".to_string()),
            address: primary.address,
            id_front_image: primary.id_front_image,
            id_back_image: primary.id_back_image,
            additional_guests: guest_count.saturating_sub(1),
        });
    }
    Ok(records)
}

/// Partial regulatory submissions are disallowed: the guest register and the
/// image archive abort unless every selected record carries both ID images.
pub fn ensure_documents_complete(records: &[GuestStayRecord]) -> Result<(), ExportError> {
    let incomplete = records.iter().filter(|r| !r.has_complete_id()).count();
    if incomplete > 0 {
        return Err(ExportError::MissingDocuments(incomplete));
    }
    Ok(())
}

/// Printable tabular report. Carries no image payloads, so it is the one
/// export that works on records with incomplete documents.
pub fn render_summary_report(
    records: &[GuestStayRecord],
    start: NaiveDate,
    end: NaiveDate,
    lodge_name: &str,
    lodge_address: &str,
    generated_at: &NaiveDateTime,
) -> String {
    let mut doc = String::new();
    doc.push_str(&format!("{}\n", lodge_name.to_uppercase()));
    doc.push_str(&format!("{lodge_address}\n\n"));
    doc.push_str("POLICE VERIFICATION REPORT\n\n");
    doc.push_str(&format!(
        "Report Period: {} - {}\n",
        start.format("%b %-d, %Y"),
        end.format("%b %-d, %Y")
    ));
    doc.push_str(&format!(
        "Generated on: {}\n\n",
        generated_at.format("%b %-d, %Y %H:%M")
    ));
    doc.push_str(&format!("Total Guests: {}\n\n", records.len()));

    doc.push_str(&format!(
        "{:<4} {:<6} {:<24} {:<14} {:<17} {:<18} {:<15} {:<15}\n",
        "#", "Room", "Guest Name", "Phone", "ID Type", "ID Number", "Check-in", "Check-out"
    ));
    doc.push_str(&format!("{}\n", "-".repeat(118)));

    for (index, record) in records.iter().enumerate() {
        doc.push_str(&format!(
            "{:<4} {:<6} {:<24} {:<14} {:<17} {:<18} {:<15} {:<15}\n",
            index + 1,
            record.room_number,
            record.guest_name,
            record.phone,
            record.id_type,
            record.id_number,
            record.check_in.format("%d/%m/%y %H:%M"),
            record.check_out.format("%d/%m/%y %H:%M"),
        ));
    }

    doc.push_str(&format!("\n{lodge_name} - Confidential\n"));
    doc
}

/// Narrative per-guest register, one block per record, with the ID images
/// optionally embedded as data URLs. Image fetches run sequentially per
/// record; a failed fetch degrades that one image to a placeholder.
pub async fn render_guest_register(
    storage: &dyn ObjectStorage,
    records: &[GuestStayRecord],
    start: NaiveDate,
    end: NaiveDate,
    lodge_name: &str,
    lodge_address: &str,
    include_images: bool,
    generated_at: &NaiveDateTime,
) -> Result<String, ExportError> {
    ensure_documents_complete(records)?;

    let mut doc = String::new();
    doc.push_str(&format!("{}\n", lodge_name.to_uppercase()));
    doc.push_str(&format!("{lodge_address}\n\n"));
    doc.push_str("DETAILED GUEST REGISTER\n\n");
    doc.push_str(&format!(
        "Period: {} - {}\n\n",
        start.format("%b %-d, %Y"),
        end.format("%b %-d, %Y")
    ));

    for (index, record) in records.iter().enumerate() {
        doc.push_str(&format!(
            "Guest #{}: {}    Room: {}\n",
            index + 1,
            record.guest_name,
            record.room_number
        ));
        doc.push_str(&format!("  Phone:     {}\n", record.phone));
        doc.push_str(&format!("  ID Type:   {}\n", record.id_type));
        doc.push_str(&format!("  ID Number: {}\n", record.id_number));
        doc.push_str(&format!(
            "  Check-in:  {}\n",
            record.check_in.format("%b %-d, %Y %H:%M")
        ));
        doc.push_str(&format!(
            "  Check-out: {}\n",
            record.check_out.format("%b %-d, %Y %H:%M")
        ));
        if let Some(address) = &record.address {
            doc.push_str(&format!("  Address:   {address}\n"));
        }
        if record.additional_guests > 0 {
            doc.push_str(&format!(
                "  Accompanying guests: {}\n",
                record.additional_guests
            ));
        }

        if include_images {
            for (label, image) in [
                ("ID Front", &record.id_front_image),
                ("ID Back", &record.id_back_image),
            ] {
                let Some(reference) = image else { continue };
                match fetch_image(storage, reference).await {
                    Ok((bytes, mime)) => {
                        let encoded = base64::engine::general_purpose::STANDARD.encode(&bytes);
                        doc.push_str(&format!("  {label}:  data:{mime};base64,{encoded}\n"));
                    }
                    Err(e) => {
                        tracing::warn!(
                            error = %e,
                            booking_id = %record.booking_id,
                            label,
                            "could not fetch ID image for register"
                        );
                        doc.push_str(&format!("  {label}:  (image unavailable)\n"));
                    }
                }
            }
        }

        doc.push_str(&format!("{}\n", "-".repeat(60)));
    }

    doc.push_str(&format!(
        "\nGenerated: {} | {lodge_name} - Confidential\n",
        generated_at.format("%b %-d, %Y %H:%M")
    ));
    Ok(doc)
}

/// Flat CSV in the shape the district portal ingests. No image payloads, no
/// completeness gate.
pub fn render_csv(records: &[GuestStayRecord]) -> Result<String, ExportError> {
    let mut writer = csv::Writer::from_writer(vec![]);
    writer
        .write_record([
            "S.No",
            "Room Number",
            "Guest Name",
            "Phone",
            "ID Type",
            "ID Number",
            "Address",
            "Check-in Date",
            "Check-in Time",
            "Check-out Date",
            "Check-out Time",
            "Additional Guests",
        ])
        .map_err(anyhow::Error::from)?;

    for (index, record) in records.iter().enumerate() {
        writer
            .write_record([
                (index + 1).to_string(),
                record.room_number.clone(),
                record.guest_name.clone(),
                record.phone.clone(),
                record.id_type.clone(),
                record.id_number.clone(),
                record.address.clone().unwrap_or_default(),
                record.check_in.format("%d/%m/%Y").to_string(),
                record.check_in.format("%H:%M").to_string(),
                record.check_out.format("%d/%m/%Y").to_string(),
                record.check_out.format("%H:%M").to_string(),
                record.additional_guests.to_string(),
            ])
            .map_err(anyhow::Error::from)?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| anyhow::anyhow!("failed to flush csv: {e}"))?;
    String::from_utf8(bytes).map_err(|e| ExportError::Internal(e.into()))
}

/// Streams both ID images of every selected guest into the sink, grouped in
/// one folder per room. A failed fetch skips that single image and the
/// export continues; the password travels to the sink untouched.
pub async fn build_archive(
    storage: &dyn ObjectStorage,
    sink: &mut dyn ArchiveSink,
    records: &[GuestStayRecord],
    password: Option<&str>,
) -> Result<ArchiveSummary, ExportError> {
    ensure_documents_complete(records)?;

    let mut entries = 0;
    let mut skipped = 0;
    for record in records {
        let folder = format!("Room_{}", record.room_number);
        let short_id = &record.booking_id[..record.booking_id.len().min(8)];
        let stem = sanitize_component(&record.guest_name);

        for (side, image) in [
            ("front", &record.id_front_image),
            ("back", &record.id_back_image),
        ] {
            let Some(reference) = image else { continue };
            match fetch_image(storage, reference).await {
                Ok((bytes, _)) => {
                    let path = format!("{folder}/{stem}_{short_id}_{side}.jpg");
                    sink.add_entry(&path, &bytes).await?;
                    entries += 1;
                }
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        booking_id = %record.booking_id,
                        side,
                        "could not fetch ID image for archive, skipping"
                    );
                    skipped += 1;
                }
            }
        }
    }

    let location = sink.finalize(password).await?;
    Ok(ArchiveSummary {
        entries,
        skipped,
        location,
    })
}

/// Stored references resolve through the object store; references degraded
/// to inline data at booking time decode locally.
async fn fetch_image(
    storage: &dyn ObjectStorage,
    reference: &str,
) -> anyhow::Result<(Vec<u8>, String)> {
    if reference.starts_with("data:") {
        return data_url_to_bytes(reference);
    }
    let bytes = storage.fetch(reference).await?;
    Ok((bytes, "image/jpeg".to_string()))
}

fn sanitize_component(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet as StdHashSet;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use chrono::Utc;

    use crate::db;
    use crate::models::{Booking, BookingStatus, Guest, IdProofType};

    struct MockStorage {
        missing: StdHashSet<String>,
    }

    impl MockStorage {
        fn new() -> Self {
            Self {
                missing: StdHashSet::new(),
            }
        }

        fn with_missing(path: &str) -> Self {
            let mut missing = StdHashSet::new();
            missing.insert(path.to_string());
            Self { missing }
        }
    }

    #[async_trait]
    impl ObjectStorage for MockStorage {
        async fn upload(&self, path: &str, _: Vec<u8>, _: &str) -> anyhow::Result<String> {
            Ok(path.to_string())
        }

        async fn signed_url(&self, path: &str) -> anyhow::Result<String> {
            Ok(format!("https://example.com/{path}"))
        }

        async fn fetch(&self, path: &str) -> anyhow::Result<Vec<u8>> {
            if self.missing.contains(path) {
                anyhow::bail!("object not found: {path}");
            }
            Ok(format!("bytes-of-{path}").into_bytes())
        }
    }

    #[derive(Default)]
    struct MockSink {
        entries: Arc<Mutex<Vec<String>>>,
        finalized_password: Arc<Mutex<Option<String>>>,
    }

    #[async_trait]
    impl ArchiveSink for MockSink {
        async fn add_entry(&mut self, path: &str, _: &[u8]) -> anyhow::Result<()> {
            self.entries.lock().unwrap().push(path.to_string());
            Ok(())
        }

        async fn finalize(&mut self, password: Option<&str>) -> anyhow::Result<String> {
            *self.finalized_password.lock().unwrap() = password.map(String::from);
            Ok("archive://done".to_string())
        }
    }

    fn dt(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn seed_booking(
        conn: &Connection,
        id: &str,
        room_number: &str,
        check_in: &str,
        guest_name: &str,
        back_image: Option<&str>,
    ) {
        let now = Utc::now().naive_utc();
        if queries::get_room_by_number(conn, room_number).unwrap().is_none() {
            let room = crate::models::Room {
                id: format!("room-{room_number}"),
                room_number: room_number.to_string(),
                floor: 1,
                room_type: crate::models::RoomType::Standard,
                base_price: 800,
                ac_charge: 300,
                geyser_charge: 100,
                status: crate::models::RoomStatus::Occupied,
                description: None,
                created_at: now,
                updated_at: now,
            };
            queries::insert_room(conn, &room).unwrap();
        }

        let booking = Booking {
            id: id.to_string(),
            room_id: format!("room-{room_number}"),
            check_in: dt(check_in),
            expected_checkout: dt("2026-08-07 10:00:00"),
            check_out: None,
            has_ac: false,
            has_geyser: false,
            base_price: 800,
            ac_charge: 0,
            geyser_charge: 0,
            total_amount: 800,
            advance_paid: 0,
            extra_charges: 0,
            status: BookingStatus::CheckedIn,
            notes: None,
            created_at: now,
            updated_at: now,
        };
        queries::insert_booking(conn, &booking).unwrap();

        let guest = Guest {
            id: format!("g-{id}"),
            booking_id: id.to_string(),
            full_name: guest_name.to_string(),
            phone: Some("9876543210".to_string()),
            phone_number: Some("9876543210".to_string()),
            email: None,
            address: Some("12 Temple Road".to_string()),
            is_primary: true,
            id_proof_type: Some(IdProofType::Aadhaar),
            id_proof_number: Some("1234-5678".to_string()),
            id_front_image: Some(format!("{id}/front.jpg")),
            id_back_image: back_image.map(String::from),
            id_verified: back_image.is_some(),
            created_at: now,
        };
        queries::insert_guest(conn, &guest).unwrap();
    }

    fn setup_three_bookings() -> (Connection, Vec<String>) {
        let conn = db::init_db(":memory:").unwrap();
        seed_booking(&conn, "bk-1", "101", "2026-08-05 12:00:00", "Asha Rao", Some("bk-1/back.jpg"));
        seed_booking(&conn, "bk-2", "102", "2026-08-05 15:00:00", "Ravi Kumar", Some("bk-2/back.jpg"));
        seed_booking(&conn, "bk-3", "103", "2026-08-06 09:00:00", "Meena Devi", None);
        let selected = vec!["bk-1".to_string(), "bk-2".to_string(), "bk-3".to_string()];
        (conn, selected)
    }

    #[test]
    fn test_collect_filters_by_date_range_and_selection() {
        let (conn, _) = setup_three_bookings();

        // Only the 5th, only two of the three ids selected.
        let records = collect_records(
            &conn,
            date("2026-08-05"),
            date("2026-08-05"),
            &["bk-1".to_string(), "bk-3".to_string()],
        )
        .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].booking_id, "bk-1");
        assert_eq!(records[0].room_number, "101");
        assert_eq!(records[0].guest_name, "Asha Rao");
        assert_eq!(records[0].additional_guests, 0);
    }

    #[test]
    fn test_incomplete_selection_fails_with_exact_count() {
        let (conn, selected) = setup_three_bookings();
        let records =
            collect_records(&conn, date("2026-08-05"), date("2026-08-06"), &selected).unwrap();
        assert_eq!(records.len(), 3);

        let err = ensure_documents_complete(&records).unwrap_err();
        assert_eq!(
            err.to_string(),
            "1 booking(s) are missing identification documents"
        );
    }

    #[tokio::test]
    async fn test_register_refuses_incomplete_records_and_produces_nothing() {
        let (conn, selected) = setup_three_bookings();
        let records =
            collect_records(&conn, date("2026-08-05"), date("2026-08-06"), &selected).unwrap();

        let storage = MockStorage::new();
        let result = render_guest_register(
            &storage,
            &records,
            date("2026-08-05"),
            date("2026-08-06"),
            "Sai Grand Lodge",
            "Surendrapuri, Yadagirigutta",
            true,
            &dt("2026-08-06 18:00:00"),
        )
        .await;
        assert!(matches!(result, Err(ExportError::MissingDocuments(1))));
    }

    #[tokio::test]
    async fn test_archive_refuses_incomplete_records_and_writes_no_entries() {
        let (conn, selected) = setup_three_bookings();
        let records =
            collect_records(&conn, date("2026-08-05"), date("2026-08-06"), &selected).unwrap();

        let storage = MockStorage::new();
        let mut sink = MockSink::default();
        let entries = Arc::clone(&sink.entries);
        let result = build_archive(&storage, &mut sink, &records, None).await;
        assert!(matches!(result, Err(ExportError::MissingDocuments(1))));
        assert!(entries.lock().unwrap().is_empty());
    }

    #[test]
    fn test_summary_report_skips_completeness_gate() {
        let (conn, selected) = setup_three_bookings();
        let records =
            collect_records(&conn, date("2026-08-05"), date("2026-08-06"), &selected).unwrap();

        let doc = render_summary_report(
            &records,
            date("2026-08-05"),
            date("2026-08-06"),
            "Sai Grand Lodge",
            "Surendrapuri, Yadagirigutta",
            &dt("2026-08-06 18:00:00"),
        );
        assert!(doc.contains("SAI GRAND LODGE"));
        assert!(doc.contains("POLICE VERIFICATION REPORT"));
        assert!(doc.contains("Total Guests: 3"));
        assert!(doc.contains("Asha Rao"));
        assert!(doc.contains("Meena Devi"));
        assert!(doc.contains("AADHAAR"));
        assert!(doc.contains("Sai Grand Lodge - Confidential"));
    }

    #[test]
    fn test_csv_skips_completeness_gate_and_lists_all_fields() {
        let (conn, selected) = setup_three_bookings();
        let records =
            collect_records(&conn, date("2026-08-05"), date("2026-08-06"), &selected).unwrap();

        let csv = render_csv(&records).unwrap();
        let mut lines = csv.lines();
        assert_eq!(
            lines.next().unwrap(),
            "S.No,Room Number,Guest Name,Phone,ID Type,ID Number,Address,Check-in Date,Check-in Time,Check-out Date,Check-out Time,Additional Guests"
        );
        assert_eq!(csv.lines().count(), 4);
        assert!(csv.contains("Asha Rao"));
        assert!(csv.contains("05/08/2026"));
        assert!(csv.contains("12 Temple Road"));
    }

    #[tokio::test]
    async fn test_register_embeds_images_and_degrades_per_image() {
        let (conn, _) = setup_three_bookings();
        let records = collect_records(
            &conn,
            date("2026-08-05"),
            date("2026-08-05"),
            &["bk-1".to_string(), "bk-2".to_string()],
        )
        .unwrap();

        let storage = MockStorage::with_missing("bk-2/back.jpg");
        let doc = render_guest_register(
            &storage,
            &records,
            date("2026-08-05"),
            date("2026-08-05"),
            "Sai Grand Lodge",
            "Surendrapuri, Yadagirigutta",
            true,
            &dt("2026-08-06 18:00:00"),
        )
        .await
        .unwrap();

        assert!(doc.contains("DETAILED GUEST REGISTER"));
        assert!(doc.contains("Guest #1: Asha Rao"));
        // The reachable images were embedded, the one missing object degraded.
        assert!(doc.contains("data:image/jpeg;base64,"));
        assert!(doc.contains("(image unavailable)"));
    }

    #[tokio::test]
    async fn test_archive_groups_by_room_and_skips_failed_fetches() {
        let (conn, _) = setup_three_bookings();
        let records = collect_records(
            &conn,
            date("2026-08-05"),
            date("2026-08-05"),
            &["bk-1".to_string(), "bk-2".to_string()],
        )
        .unwrap();

        let storage = MockStorage::with_missing("bk-2/back.jpg");
        let mut sink = MockSink::default();
        let entries = Arc::clone(&sink.entries);
        let password_seen = Arc::clone(&sink.finalized_password);

        let summary = build_archive(&storage, &mut sink, &records, Some("sealed"))
            .await
            .unwrap();

        assert_eq!(summary.entries, 3);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.location, "archive://done");

        let entries = entries.lock().unwrap();
        assert!(entries.iter().any(|p| p.starts_with("Room_101/Asha_Rao")));
        assert!(entries.iter().any(|p| p.starts_with("Room_102/Ravi_Kumar")));
        assert!(entries.iter().all(|p| p.ends_with("front.jpg") || p.ends_with("back.jpg")));
        assert_eq!(password_seen.lock().unwrap().as_deref(), Some("sealed"));
    }

    #[tokio::test]
    async fn test_register_resolves_inline_references_locally() {
        let conn = db::init_db(":memory:").unwrap();
        seed_booking(&conn, "bk-9", "104", "2026-08-05 12:00:00", "Asha Rao", Some("x"));
        conn.execute(
            "UPDATE guests SET id_front_image = 'data:image/jpeg;base64,aGVsbG8=', id_back_image = 'data:image/jpeg;base64,d29ybGQ=' WHERE booking_id = 'bk-9'",
            [],
        )
        .unwrap();

        let records = collect_records(
            &conn,
            date("2026-08-05"),
            date("2026-08-05"),
            &["bk-9".to_string()],
        )
        .unwrap();

        let storage = MockStorage::new();
        let doc = render_guest_register(
            &storage,
            &records,
            date("2026-08-05"),
            date("2026-08-05"),
            "Sai Grand Lodge",
            "Surendrapuri, Yadagirigutta",
            true,
            &dt("2026-08-06 18:00:00"),
        )
        .await
        .unwrap();
        assert!(doc.contains(&base64::engine::general_purpose::STANDARD.encode("hello")));
    }

    #[test]
    fn test_parse_export_date() {
        assert!(parse_export_date("2026-08-05").is_ok());
        assert!(parse_export_date("05/08/2026").is_err());
    }
}
