use chrono::{NaiveDateTime, Utc};
use rusqlite::{params, Connection};
use serde::Serialize;

use crate::models::{Booking, BookingStatus, Guest, IdProofType, Room, RoomStatus, RoomType};

const DATETIME_FMT: &str = "%Y-%m-%d %H:%M:%S";

fn fmt_dt(dt: &NaiveDateTime) -> String {
    dt.format(DATETIME_FMT).to_string()
}

fn parse_dt(s: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(s, DATETIME_FMT).unwrap_or_else(|_| Utc::now().naive_utc())
}

// ── Rooms ──

pub fn insert_room(conn: &Connection, room: &Room) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO rooms (id, room_number, floor, room_type, base_price, ac_charge, geyser_charge, status, description, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            room.id,
            room.room_number,
            room.floor,
            room.room_type.as_str(),
            room.base_price,
            room.ac_charge,
            room.geyser_charge,
            room.status.as_str(),
            room.description,
            fmt_dt(&room.created_at),
            fmt_dt(&room.updated_at),
        ],
    )?;
    Ok(())
}

pub fn list_rooms(conn: &Connection) -> anyhow::Result<Vec<Room>> {
    let mut stmt = conn.prepare(
        "SELECT id, room_number, floor, room_type, base_price, ac_charge, geyser_charge, status, description, created_at, updated_at
         FROM rooms ORDER BY floor ASC, room_number ASC",
    )?;

    let rows = stmt.query_map([], |row| Ok(parse_room_row(row)))?;

    let mut rooms = vec![];
    for row in rows {
        rooms.push(row??);
    }
    Ok(rooms)
}

pub fn get_room(conn: &Connection, id: &str) -> anyhow::Result<Option<Room>> {
    let result = conn.query_row(
        "SELECT id, room_number, floor, room_type, base_price, ac_charge, geyser_charge, status, description, created_at, updated_at
         FROM rooms WHERE id = ?1",
        params![id],
        |row| Ok(parse_room_row(row)),
    );

    match result {
        Ok(room) => Ok(Some(room?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn get_room_by_number(conn: &Connection, room_number: &str) -> anyhow::Result<Option<Room>> {
    let result = conn.query_row(
        "SELECT id, room_number, floor, room_type, base_price, ac_charge, geyser_charge, status, description, created_at, updated_at
         FROM rooms WHERE room_number = ?1",
        params![room_number],
        |row| Ok(parse_room_row(row)),
    );

    match result {
        Ok(room) => Ok(Some(room?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn update_room_status(conn: &Connection, id: &str, status: RoomStatus) -> anyhow::Result<bool> {
    let now = fmt_dt(&Utc::now().naive_utc());
    let count = conn.execute(
        "UPDATE rooms SET status = ?1, updated_at = ?2 WHERE id = ?3",
        params![status.as_str(), now, id],
    )?;
    Ok(count > 0)
}

pub fn update_room_pricing(
    conn: &Connection,
    id: &str,
    base_price: i64,
    ac_charge: i64,
    geyser_charge: i64,
) -> anyhow::Result<bool> {
    let now = fmt_dt(&Utc::now().naive_utc());
    let count = conn.execute(
        "UPDATE rooms SET base_price = ?1, ac_charge = ?2, geyser_charge = ?3, updated_at = ?4 WHERE id = ?5",
        params![base_price, ac_charge, geyser_charge, now, id],
    )?;
    Ok(count > 0)
}

fn parse_room_row(row: &rusqlite::Row) -> anyhow::Result<Room> {
    let room_type: String = row.get(3)?;
    let status: String = row.get(7)?;
    let created_at: String = row.get(9)?;
    let updated_at: String = row.get(10)?;

    Ok(Room {
        id: row.get(0)?,
        room_number: row.get(1)?,
        floor: row.get(2)?,
        room_type: RoomType::parse(&room_type),
        base_price: row.get(4)?,
        ac_charge: row.get(5)?,
        geyser_charge: row.get(6)?,
        status: RoomStatus::parse(&status),
        description: row.get(8)?,
        created_at: parse_dt(&created_at),
        updated_at: parse_dt(&updated_at),
    })
}

// ── Bookings ──

pub fn insert_booking(conn: &Connection, booking: &Booking) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO bookings (id, room_id, check_in, expected_checkout, check_out, has_ac, has_geyser,
                               base_price, ac_charge, geyser_charge, total_amount, advance_paid, extra_charges,
                               status, notes, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
        params![
            booking.id,
            booking.room_id,
            fmt_dt(&booking.check_in),
            fmt_dt(&booking.expected_checkout),
            booking.check_out.as_ref().map(fmt_dt),
            booking.has_ac as i32,
            booking.has_geyser as i32,
            booking.base_price,
            booking.ac_charge,
            booking.geyser_charge,
            booking.total_amount,
            booking.advance_paid,
            booking.extra_charges,
            booking.status.as_str(),
            booking.notes,
            fmt_dt(&booking.created_at),
            fmt_dt(&booking.updated_at),
        ],
    )?;
    Ok(())
}

const BOOKING_COLUMNS: &str = "id, room_id, check_in, expected_checkout, check_out, has_ac, has_geyser, \
     base_price, ac_charge, geyser_charge, total_amount, advance_paid, extra_charges, status, notes, \
     created_at, updated_at";

pub fn get_booking(conn: &Connection, id: &str) -> anyhow::Result<Option<Booking>> {
    let result = conn.query_row(
        &format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = ?1"),
        params![id],
        |row| Ok(parse_booking_row(row)),
    );

    match result {
        Ok(booking) => Ok(Some(booking?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn get_all_bookings(conn: &Connection, limit: i64) -> anyhow::Result<Vec<Booking>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {BOOKING_COLUMNS} FROM bookings ORDER BY created_at DESC LIMIT ?1"
    ))?;

    let rows = stmt.query_map(params![limit], |row| Ok(parse_booking_row(row)))?;

    let mut bookings = vec![];
    for row in rows {
        bookings.push(row??);
    }
    Ok(bookings)
}

pub fn get_active_bookings(conn: &Connection) -> anyhow::Result<Vec<Booking>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {BOOKING_COLUMNS} FROM bookings
         WHERE status IN ('confirmed', 'checked_in') ORDER BY check_in ASC"
    ))?;

    let rows = stmt.query_map([], |row| Ok(parse_booking_row(row)))?;

    let mut bookings = vec![];
    for row in rows {
        bookings.push(row??);
    }
    Ok(bookings)
}

pub fn get_bookings_checked_in_range(
    conn: &Connection,
    start: &NaiveDateTime,
    end: &NaiveDateTime,
) -> anyhow::Result<Vec<Booking>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {BOOKING_COLUMNS} FROM bookings
         WHERE check_in >= ?1 AND check_in <= ?2 ORDER BY check_in ASC"
    ))?;

    let rows = stmt.query_map(params![fmt_dt(start), fmt_dt(end)], |row| {
        Ok(parse_booking_row(row))
    })?;

    let mut bookings = vec![];
    for row in rows {
        bookings.push(row??);
    }
    Ok(bookings)
}

pub fn checkout_booking(
    conn: &Connection,
    id: &str,
    check_out: &NaiveDateTime,
    extra_charges: i64,
) -> anyhow::Result<bool> {
    let now = fmt_dt(&Utc::now().naive_utc());
    let count = conn.execute(
        "UPDATE bookings SET status = 'checked_out', check_out = ?1, extra_charges = ?2, updated_at = ?3
         WHERE id = ?4",
        params![fmt_dt(check_out), extra_charges, now, id],
    )?;
    Ok(count > 0)
}

fn parse_booking_row(row: &rusqlite::Row) -> anyhow::Result<Booking> {
    let check_in: String = row.get(2)?;
    let expected_checkout: String = row.get(3)?;
    let check_out: Option<String> = row.get(4)?;
    let status: String = row.get(13)?;
    let created_at: String = row.get(15)?;
    let updated_at: String = row.get(16)?;

    Ok(Booking {
        id: row.get(0)?,
        room_id: row.get(1)?,
        check_in: parse_dt(&check_in),
        expected_checkout: parse_dt(&expected_checkout),
        check_out: check_out.as_deref().map(parse_dt),
        has_ac: row.get::<_, i32>(5)? != 0,
        has_geyser: row.get::<_, i32>(6)? != 0,
        base_price: row.get(7)?,
        ac_charge: row.get(8)?,
        geyser_charge: row.get(9)?,
        total_amount: row.get(10)?,
        advance_paid: row.get(11)?,
        extra_charges: row.get(12)?,
        status: BookingStatus::parse(&status),
        notes: row.get(14)?,
        created_at: parse_dt(&created_at),
        updated_at: parse_dt(&updated_at),
    })
}

// ── Guests ──

pub fn insert_guest(conn: &Connection, guest: &Guest) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO guests (id, booking_id, full_name, phone, phone_number, email, address, is_primary,
                             id_proof_type, id_proof_number, id_front_image, id_back_image, id_verified, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
        params![
            guest.id,
            guest.booking_id,
            guest.full_name,
            guest.phone,
            guest.phone_number,
            guest.email,
            guest.address,
            guest.is_primary as i32,
            guest.id_proof_type.map(|t| t.as_str()),
            guest.id_proof_number,
            guest.id_front_image,
            guest.id_back_image,
            guest.id_verified as i32,
            fmt_dt(&guest.created_at),
        ],
    )?;
    Ok(())
}

const GUEST_COLUMNS: &str = "id, booking_id, full_name, phone, phone_number, email, address, is_primary, \
     id_proof_type, id_proof_number, id_front_image, id_back_image, id_verified, created_at";

pub fn get_guests_for_booking(conn: &Connection, booking_id: &str) -> anyhow::Result<Vec<Guest>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {GUEST_COLUMNS} FROM guests WHERE booking_id = ?1 ORDER BY is_primary DESC, created_at ASC"
    ))?;

    let rows = stmt.query_map(params![booking_id], |row| Ok(parse_guest_row(row)))?;

    let mut guests = vec![];
    for row in rows {
        guests.push(row??);
    }
    Ok(guests)
}

pub fn get_primary_guest(conn: &Connection, booking_id: &str) -> anyhow::Result<Option<Guest>> {
    let result = conn.query_row(
        &format!("SELECT {GUEST_COLUMNS} FROM guests WHERE booking_id = ?1 AND is_primary = 1 LIMIT 1"),
        params![booking_id],
        |row| Ok(parse_guest_row(row)),
    );

    match result {
        Ok(guest) => Ok(Some(guest?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn parse_guest_row(row: &rusqlite::Row) -> anyhow::Result<Guest> {
    let id_proof_type: Option<String> = row.get(8)?;
    let created_at: String = row.get(13)?;

    Ok(Guest {
        id: row.get(0)?,
        booking_id: row.get(1)?,
        full_name: row.get(2)?,
        phone: row.get(3)?,
        phone_number: row.get(4)?,
        email: row.get(5)?,
        address: row.get(6)?,
        is_primary: row.get::<_, i32>(7)? != 0,
        id_proof_type: id_proof_type.as_deref().and_then(IdProofType::parse),
        id_proof_number: row.get(9)?,
        id_front_image: row.get(10)?,
        id_back_image: row.get(11)?,
        id_verified: row.get::<_, i32>(12)? != 0,
        created_at: parse_dt(&created_at),
    })
}

// ── Guest lookup by phone ──

/// The most recent guest record for a normalized phone number, plus the
/// first/last stay timestamps across every stay on that number.
pub struct GuestLookupRow {
    pub full_name: String,
    pub phone_number: Option<String>,
    pub id_verified: bool,
    pub id_proof_type: Option<IdProofType>,
    pub id_front_image: Option<String>,
    pub id_back_image: Option<String>,
    pub first_stay_at: NaiveDateTime,
    pub last_stay_at: NaiveDateTime,
}

pub fn lookup_guest_by_phone(
    conn: &Connection,
    phone_number: &str,
) -> anyhow::Result<Option<GuestLookupRow>> {
    let result = conn.query_row(
        "SELECT full_name, phone_number, id_verified, id_proof_type, id_front_image, id_back_image, created_at
         FROM guests WHERE phone_number = ?1 ORDER BY created_at DESC, rowid DESC LIMIT 1",
        params![phone_number],
        |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, Option<String>>(1)?,
                row.get::<_, i32>(2)? != 0,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, Option<String>>(4)?,
                row.get::<_, Option<String>>(5)?,
            ))
        },
    );

    let (full_name, stored_phone, id_verified, proof_type, front, back) = match result {
        Ok(row) => row,
        Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let (first_stay, last_stay): (String, String) = conn.query_row(
        "SELECT MIN(created_at), MAX(created_at) FROM guests WHERE phone_number = ?1",
        params![phone_number],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;

    Ok(Some(GuestLookupRow {
        full_name,
        phone_number: stored_phone,
        id_verified,
        id_proof_type: proof_type.as_deref().and_then(IdProofType::parse),
        id_front_image: front,
        id_back_image: back,
        first_stay_at: parse_dt(&first_stay),
        last_stay_at: parse_dt(&last_stay),
    }))
}

// ── Departures ──

pub struct DepartureRow {
    pub booking_id: String,
    pub room_number: String,
    pub guest_name: Option<String>,
    pub expected_checkout: NaiveDateTime,
}

pub fn get_departures(conn: &Connection) -> anyhow::Result<Vec<DepartureRow>> {
    let mut stmt = conn.prepare(
        "SELECT b.id, r.room_number, g.full_name, b.expected_checkout
         FROM bookings b
         JOIN rooms r ON r.id = b.room_id
         LEFT JOIN guests g ON g.booking_id = b.id AND g.is_primary = 1
         WHERE b.status = 'checked_in'
         ORDER BY b.expected_checkout ASC",
    )?;

    let rows = stmt.query_map([], |row| {
        let expected: String = row.get(3)?;
        Ok(DepartureRow {
            booking_id: row.get(0)?,
            room_number: row.get(1)?,
            guest_name: row.get(2)?,
            expected_checkout: parse_dt(&expected),
        })
    })?;

    let mut departures = vec![];
    for row in rows {
        departures.push(row?);
    }
    Ok(departures)
}

// ── Dashboard ──

#[derive(Debug, Serialize)]
pub struct DashboardStats {
    pub total_rooms: i64,
    pub occupied_rooms: i64,
    pub available_rooms: i64,
    pub cleaning_rooms: i64,
    pub maintenance_rooms: i64,
    pub guests_today: i64,
    pub today_collection: i64,
    pub occupancy_percentage: i64,
    pub is_weekend_rush: bool,
}

pub fn get_dashboard_stats(conn: &Connection, now: &NaiveDateTime) -> anyhow::Result<DashboardStats> {
    let count_status = |status: &str| -> i64 {
        conn.query_row(
            "SELECT COUNT(*) FROM rooms WHERE status = ?1",
            params![status],
            |row| row.get(0),
        )
        .unwrap_or(0)
    };

    let total_rooms: i64 = conn
        .query_row("SELECT COUNT(*) FROM rooms", [], |row| row.get(0))
        .unwrap_or(0);
    let occupied_rooms = count_status("occupied");
    let available_rooms = count_status("available");
    let cleaning_rooms = count_status("cleaning");
    let maintenance_rooms = count_status("maintenance");

    let day_start = now.date().and_hms_opt(0, 0, 0).unwrap_or(*now);
    let day_end = now.date().and_hms_opt(23, 59, 59).unwrap_or(*now);
    let (start_str, end_str) = (fmt_dt(&day_start), fmt_dt(&day_end));

    let guests_today: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM guests g
             JOIN bookings b ON b.id = g.booking_id
             WHERE b.check_in >= ?1 AND b.check_in <= ?2",
            params![start_str, end_str],
            |row| row.get(0),
        )
        .unwrap_or(0);

    let today_collection: i64 = conn
        .query_row(
            "SELECT COALESCE(SUM(total_amount + extra_charges), 0) FROM bookings
             WHERE check_in >= ?1 AND check_in <= ?2",
            params![start_str, end_str],
            |row| row.get(0),
        )
        .unwrap_or(0);

    // Function halls and rooms under maintenance are not bookable nights.
    let bookable_rooms: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM rooms WHERE room_type != 'function_hall' AND status != 'maintenance'",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    let occupancy_percentage = if bookable_rooms > 0 {
        ((occupied_rooms as f64 / bookable_rooms as f64) * 100.0).round() as i64
    } else {
        0
    };

    let weekday = now.format("%a").to_string();
    let is_weekend_rush = matches!(weekday.as_str(), "Fri" | "Sat" | "Sun");

    Ok(DashboardStats {
        total_rooms,
        occupied_rooms,
        available_rooms,
        cleaning_rooms,
        maintenance_rooms,
        guests_today,
        today_collection,
        occupancy_percentage,
        is_weekend_rush,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use chrono::Utc;

    fn setup_db() -> Connection {
        db::init_db(":memory:").unwrap()
    }

    fn make_room(number: &str, floor: i64, status: RoomStatus) -> Room {
        let now = Utc::now().naive_utc();
        Room {
            id: format!("room-{number}"),
            room_number: number.to_string(),
            floor,
            room_type: RoomType::Standard,
            base_price: 800,
            ac_charge: 300,
            geyser_charge: 100,
            status,
            description: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_list_rooms_ordered_by_floor_then_number() {
        let conn = setup_db();
        insert_room(&conn, &make_room("201", 2, RoomStatus::Available)).unwrap();
        insert_room(&conn, &make_room("102", 1, RoomStatus::Available)).unwrap();
        insert_room(&conn, &make_room("101", 1, RoomStatus::Available)).unwrap();

        let rooms = list_rooms(&conn).unwrap();
        let numbers: Vec<_> = rooms.iter().map(|r| r.room_number.as_str()).collect();
        assert_eq!(numbers, vec!["101", "102", "201"]);
    }

    #[test]
    fn test_room_status_roundtrip() {
        let conn = setup_db();
        insert_room(&conn, &make_room("101", 1, RoomStatus::Available)).unwrap();

        assert!(update_room_status(&conn, "room-101", RoomStatus::Cleaning).unwrap());
        let room = get_room(&conn, "room-101").unwrap().unwrap();
        assert_eq!(room.status, RoomStatus::Cleaning);

        assert!(!update_room_status(&conn, "missing", RoomStatus::Cleaning).unwrap());
    }

    #[test]
    fn test_update_room_pricing() {
        let conn = setup_db();
        insert_room(&conn, &make_room("101", 1, RoomStatus::Available)).unwrap();

        assert!(update_room_pricing(&conn, "room-101", 1200, 400, 150).unwrap());
        let room = get_room(&conn, "room-101").unwrap().unwrap();
        assert_eq!(room.base_price, 1200);
        assert_eq!(room.ac_charge, 400);
        assert_eq!(room.geyser_charge, 150);
    }

    #[test]
    fn test_lookup_guest_by_phone_picks_latest_stay() {
        let conn = setup_db();
        let mut guest = Guest {
            id: "g-1".to_string(),
            booking_id: "b-1".to_string(),
            full_name: "Asha Rao".to_string(),
            phone: Some("98765 43210".to_string()),
            phone_number: Some("9876543210".to_string()),
            email: None,
            address: None,
            is_primary: true,
            id_proof_type: Some(IdProofType::Aadhaar),
            id_proof_number: Some("1234".to_string()),
            id_front_image: Some("old/front.jpg".to_string()),
            id_back_image: Some("old/back.jpg".to_string()),
            id_verified: true,
            created_at: parse_dt("2026-01-05 12:00:00"),
        };
        insert_guest(&conn, &guest).unwrap();

        guest.id = "g-2".to_string();
        guest.booking_id = "b-2".to_string();
        guest.id_front_image = Some("new/front.jpg".to_string());
        guest.id_back_image = Some("new/back.jpg".to_string());
        guest.created_at = parse_dt("2026-06-20 15:00:00");
        insert_guest(&conn, &guest).unwrap();

        let row = lookup_guest_by_phone(&conn, "9876543210").unwrap().unwrap();
        assert_eq!(row.full_name, "Asha Rao");
        assert!(row.id_verified);
        assert_eq!(row.id_front_image.as_deref(), Some("new/front.jpg"));
        assert_eq!(row.first_stay_at, parse_dt("2026-01-05 12:00:00"));
        assert_eq!(row.last_stay_at, parse_dt("2026-06-20 15:00:00"));
    }

    #[test]
    fn test_lookup_guest_by_phone_not_found() {
        let conn = setup_db();
        assert!(lookup_guest_by_phone(&conn, "9999999999").unwrap().is_none());
    }

    #[test]
    fn test_dashboard_stats_counts_and_occupancy() {
        let conn = setup_db();
        insert_room(&conn, &make_room("101", 1, RoomStatus::Occupied)).unwrap();
        insert_room(&conn, &make_room("102", 1, RoomStatus::Available)).unwrap();
        insert_room(&conn, &make_room("103", 1, RoomStatus::Cleaning)).unwrap();
        insert_room(&conn, &make_room("104", 1, RoomStatus::Maintenance)).unwrap();
        let mut hall = make_room("H1", 0, RoomStatus::Available);
        hall.room_type = RoomType::FunctionHall;
        insert_room(&conn, &hall).unwrap();

        let now = parse_dt("2026-08-05 12:00:00");
        let stats = get_dashboard_stats(&conn, &now).unwrap();
        assert_eq!(stats.total_rooms, 5);
        assert_eq!(stats.occupied_rooms, 1);
        assert_eq!(stats.available_rooms, 2);
        assert_eq!(stats.cleaning_rooms, 1);
        assert_eq!(stats.maintenance_rooms, 1);
        // 1 occupied out of 3 bookable (hall and maintenance excluded).
        assert_eq!(stats.occupancy_percentage, 33);
        // 2026-08-05 is a Wednesday.
        assert!(!stats.is_weekend_rush);
    }

    #[test]
    fn test_dashboard_weekend_rush_flag() {
        let conn = setup_db();
        let friday = parse_dt("2026-08-07 12:00:00");
        let stats = get_dashboard_stats(&conn, &friday).unwrap();
        assert!(stats.is_weekend_rush);
    }
}
