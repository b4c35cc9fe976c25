mod common;

use common::{TestServer, ALICE, ALICE_PASSWORD};
use directory::backend::static_backend::{StaticDirectory, StaticUser};
use directory::password::hash_password;
use directory::Principal;
use store::Store;

const EVENT: &str = "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nPRODID:-//test//test//EN\r\nBEGIN:VEVENT\r\nUID:evt-1\r\nDTSTAMP:20260101T000000Z\r\nDTSTART:20260201T100000Z\r\nDTEND:20260201T110000Z\r\nSUMMARY:Planning\r\nEND:VEVENT\r\nEND:VCALENDAR\r\n";

#[tokio::test]
async fn s1_propfind_discovers_calendar_home() {
    let server = TestServer::spawn().await;
    let client = server.client();

    let resp = client
        .request(reqwest::Method::from_bytes(b"PROPFIND").unwrap(), format!("{}/calendars/{}/", server.base_url, ALICE))
        .basic_auth(ALICE, Some(ALICE_PASSWORD))
        .header("depth", "0")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 207);
    let body = resp.text().await.unwrap();
    assert!(body.contains("multistatus"));

    server.shutdown();
}

#[tokio::test]
async fn s2_unauthenticated_request_is_rejected() {
    let server = TestServer::spawn().await;
    let client = server.client();

    let resp = client
        .request(reqwest::Method::from_bytes(b"PROPFIND").unwrap(), format!("{}/calendars/{}/", server.base_url, ALICE))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 401);

    server.shutdown();
}

#[tokio::test]
async fn s3_mkcalendar_put_get_delete_round_trip() {
    let server = TestServer::spawn().await;
    let client = server.client();
    let collection_url = format!("{}/calendars/{}/default/", server.base_url, ALICE);

    let resp = client
        .request(reqwest::Method::from_bytes(b"MKCALENDAR").unwrap(), &collection_url)
        .basic_auth(ALICE, Some(ALICE_PASSWORD))
        .body(
            r#"<?xml version="1.0" encoding="utf-8" ?>
            <C:mkcalendar xmlns:D="DAV:" xmlns:C="urn:ietf:params:xml:ns:caldav">
              <D:set><D:prop><D:displayname>Personal</D:displayname></D:prop></D:set>
            </C:mkcalendar>"#,
        )
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 201);

    let object_url = format!("{}evt-1.ics", collection_url);
    let resp = client
        .put(&object_url)
        .basic_auth(ALICE, Some(ALICE_PASSWORD))
        .header("if-none-match", "*")
        .header("content-type", "text/calendar")
        .body(EVENT)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 201);
    let etag = resp.headers().get("etag").unwrap().to_str().unwrap().to_string();

    let resp = client.get(&object_url).basic_auth(ALICE, Some(ALICE_PASSWORD)).send().await.unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    let body = resp.text().await.unwrap();
    assert!(body.contains("UID:evt-1"));

    // conditional GET with the fresh ETag should short-circuit to 304
    let resp = client
        .get(&object_url)
        .basic_auth(ALICE, Some(ALICE_PASSWORD))
        .header("if-none-match", etag)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 304);

    let resp = client.delete(&object_url).basic_auth(ALICE, Some(ALICE_PASSWORD)).send().await.unwrap();
    assert_eq!(resp.status().as_u16(), 204);

    let resp = client.get(&object_url).basic_auth(ALICE, Some(ALICE_PASSWORD)).send().await.unwrap();
    assert_eq!(resp.status().as_u16(), 404);

    server.shutdown();
}

#[tokio::test]
async fn s4_put_rejects_uid_mismatch_and_stranger_writes() {
    let server = TestServer::spawn().await;
    let client = server.client();
    let collection_url = format!("{}/calendars/{}/default/", server.base_url, ALICE);

    client
        .request(reqwest::Method::from_bytes(b"MKCALENDAR").unwrap(), &collection_url)
        .basic_auth(ALICE, Some(ALICE_PASSWORD))
        .body("")
        .send()
        .await
        .unwrap();

    let resp = client
        .put(format!("{}wrong-uid.ics", collection_url))
        .basic_auth(ALICE, Some(ALICE_PASSWORD))
        .body(EVENT)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 400);

    let resp = client
        .put(format!("{}evt-1.ics", collection_url))
        .basic_auth("mallory", Some("whatever"))
        .body(EVENT)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 401);

    server.shutdown();
}

#[tokio::test]
async fn s4b_put_preconditions_return_412_not_409() {
    let server = TestServer::spawn().await;
    let client = server.client();
    let collection_url = format!("{}/calendars/{}/default/", server.base_url, ALICE);

    client
        .request(reqwest::Method::from_bytes(b"MKCALENDAR").unwrap(), &collection_url)
        .basic_auth(ALICE, Some(ALICE_PASSWORD))
        .body("")
        .send()
        .await
        .unwrap();

    let object_url = format!("{}evt-1.ics", collection_url);
    let resp = client
        .put(&object_url)
        .basic_auth(ALICE, Some(ALICE_PASSWORD))
        .header("if-none-match", "*")
        .body(EVENT)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 201);

    // creating over an existing resource with If-None-Match: * is a precondition failure, not a conflict
    let resp = client
        .put(&object_url)
        .basic_auth(ALICE, Some(ALICE_PASSWORD))
        .header("if-none-match", "*")
        .body(EVENT)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 412);

    // writing with a stale If-Match ETag is the same precondition-failure family
    let resp = client
        .put(&object_url)
        .basic_auth(ALICE, Some(ALICE_PASSWORD))
        .header("if-match", "\"not-the-real-etag\"")
        .body(EVENT)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 412);

    server.shutdown();
}

#[tokio::test]
async fn s5_sync_collection_reports_changes_since_token() {
    let server = TestServer::spawn().await;
    let client = server.client();
    let collection_url = format!("{}/calendars/{}/default/", server.base_url, ALICE);

    client
        .request(reqwest::Method::from_bytes(b"MKCALENDAR").unwrap(), &collection_url)
        .basic_auth(ALICE, Some(ALICE_PASSWORD))
        .body("")
        .send()
        .await
        .unwrap();

    let initial_sync = r#"<?xml version="1.0" encoding="utf-8" ?>
        <D:sync-collection xmlns:D="DAV:">
          <D:sync-token></D:sync-token>
          <D:prop><D:getetag/></D:prop>
        </D:sync-collection>"#;
    let resp = client
        .request(reqwest::Method::from_bytes(b"REPORT").unwrap(), &collection_url)
        .basic_auth(ALICE, Some(ALICE_PASSWORD))
        .body(initial_sync)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 207);
    let body = resp.text().await.unwrap();
    let token_start = body.find("<D:sync-token>").unwrap() + "<D:sync-token>".len();
    let token_end = body[token_start..].find("</D:sync-token>").unwrap() + token_start;
    let first_token = body[token_start..token_end].to_string();

    client
        .put(format!("{}evt-1.ics", collection_url))
        .basic_auth(ALICE, Some(ALICE_PASSWORD))
        .body(EVENT)
        .send()
        .await
        .unwrap();

    let incremental_sync = format!(
        r#"<?xml version="1.0" encoding="utf-8" ?>
        <D:sync-collection xmlns:D="DAV:">
          <D:sync-token>{}</D:sync-token>
          <D:prop><D:getetag/></D:prop>
        </D:sync-collection>"#,
        first_token
    );
    let resp = client
        .request(reqwest::Method::from_bytes(b"REPORT").unwrap(), &collection_url)
        .basic_auth(ALICE, Some(ALICE_PASSWORD))
        .body(incremental_sync)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 207);
    let body = resp.text().await.unwrap();
    assert!(body.contains("evt-1.ics"));

    server.shutdown();
}

#[tokio::test]
async fn s6_calendar_query_filters_by_time_range() {
    let server = TestServer::spawn().await;
    let client = server.client();
    let collection_url = format!("{}/calendars/{}/default/", server.base_url, ALICE);

    client
        .request(reqwest::Method::from_bytes(b"MKCALENDAR").unwrap(), &collection_url)
        .basic_auth(ALICE, Some(ALICE_PASSWORD))
        .body("")
        .send()
        .await
        .unwrap();
    client
        .put(format!("{}evt-1.ics", collection_url))
        .basic_auth(ALICE, Some(ALICE_PASSWORD))
        .header("if-none-match", "*")
        .body(EVENT)
        .send()
        .await
        .unwrap();

    let query = |start: &str, end: &str| {
        format!(
            r#"<?xml version="1.0" encoding="utf-8" ?>
            <C:calendar-query xmlns:D="DAV:" xmlns:C="urn:ietf:params:xml:ns:caldav">
              <D:prop><D:getetag/><C:calendar-data/></D:prop>
              <C:filter>
                <C:comp-filter name="VCALENDAR">
                  <C:comp-filter name="VEVENT">
                    <C:time-range start="{}" end="{}"/>
                  </C:comp-filter>
                </C:comp-filter>
              </C:filter>
            </C:calendar-query>"#,
            start, end
        )
    };

    // the event runs 2026-02-01T10:00-11:00Z; a range covering that day matches
    let resp = client
        .request(reqwest::Method::from_bytes(b"REPORT").unwrap(), &collection_url)
        .basic_auth(ALICE, Some(ALICE_PASSWORD))
        .body(query("20260201T000000Z", "20260202T000000Z"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 207);
    let body = resp.text().await.unwrap();
    assert!(body.contains("evt-1.ics"));

    // a range entirely before the event matches nothing
    let resp = client
        .request(reqwest::Method::from_bytes(b"REPORT").unwrap(), &collection_url)
        .basic_auth(ALICE, Some(ALICE_PASSWORD))
        .body(query("20260101T000000Z", "20260102T000000Z"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 207);
    let body = resp.text().await.unwrap();
    assert!(!body.contains("evt-1.ics"));

    server.shutdown();
}

#[tokio::test]
async fn s7_shared_calendar_is_discoverable_only_by_grantee() {
    let dir = StaticDirectory::new();
    dir.add_user(StaticUser {
        principal: Principal::new(ALICE, "uid=alice,dc=example"),
        password_hash: hash_password(ALICE_PASSWORD).unwrap(),
        groups: vec![],
        calendar_ids: vec!["default".into()],
    })
    .await;
    dir.add_user(StaticUser {
        principal: Principal::new("bob", "uid=bob,dc=example"),
        password_hash: hash_password("bob's password").unwrap(),
        groups: vec![],
        calendar_ids: vec![],
    })
    .await;
    dir.add_user(StaticUser {
        principal: Principal::new("carol", "uid=carol,dc=example"),
        password_hash: hash_password("carol's password").unwrap(),
        groups: vec![],
        calendar_ids: vec![],
    })
    .await;
    dir.grant_user("bob", &format!("{}/team", ALICE), directory::acl::PRIV_READ).await;

    let server = TestServer::spawn_with_directory(dir).await;
    let client = server.client();
    let team_url = format!("{}/calendars/{}/team/", server.base_url, ALICE);

    client
        .request(reqwest::Method::from_bytes(b"MKCALENDAR").unwrap(), &team_url)
        .basic_auth(ALICE, Some(ALICE_PASSWORD))
        .body("")
        .send()
        .await
        .unwrap();

    // bob's own calendar home lists alice's team calendar under shared/
    let resp = client
        .request(reqwest::Method::from_bytes(b"PROPFIND").unwrap(), format!("{}/calendars/bob/", server.base_url))
        .basic_auth("bob", Some("bob's password"))
        .header("depth", "1")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 207);
    let body = resp.text().await.unwrap();
    assert!(body.contains(&format!("/calendars/bob/shared/{}/team/", ALICE)));

    // bob can GET an object through the shared mount once alice has created one
    client
        .put(format!("{}evt-1.ics", team_url))
        .basic_auth(ALICE, Some(ALICE_PASSWORD))
        .header("if-none-match", "*")
        .body(EVENT)
        .send()
        .await
        .unwrap();
    let shared_object_url = format!("{}/calendars/bob/shared/{}/team/evt-1.ics", server.base_url, ALICE);
    let resp = client.get(&shared_object_url).basic_auth("bob", Some("bob's password")).send().await.unwrap();
    assert_eq!(resp.status().as_u16(), 200);

    // carol has no grant: her own calendar home never lists alice's team calendar
    let resp = client
        .request(reqwest::Method::from_bytes(b"PROPFIND").unwrap(), format!("{}/calendars/carol/", server.base_url))
        .basic_auth("carol", Some("carol's password"))
        .header("depth", "1")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 207);
    let body = resp.text().await.unwrap();
    assert!(!body.contains("shared"));

    // and a direct request for the same resource is forbidden outright
    let carol_attempt_url = format!("{}/calendars/carol/shared/{}/team/", server.base_url, ALICE);
    let resp = client
        .request(reqwest::Method::from_bytes(b"PROPFIND").unwrap(), &carol_attempt_url)
        .basic_auth("carol", Some("carol's password"))
        .header("depth", "0")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 403);

    server.shutdown();
}

#[tokio::test]
async fn s8_organizer_put_delivers_itip_request_to_attendee_inbox() {
    let dir = StaticDirectory::new();
    let alice_principal =
        Principal { email: Some("alice@example.org".into()), ..Principal::new(ALICE, "uid=alice,dc=example") };
    dir.add_user(StaticUser {
        principal: alice_principal,
        password_hash: hash_password(ALICE_PASSWORD).unwrap(),
        groups: vec![],
        calendar_ids: vec!["default".into()],
    })
    .await;
    let bob_principal =
        Principal { email: Some("bob@example.org".into()), ..Principal::new("bob", "uid=bob,dc=example") };
    dir.add_user(StaticUser {
        principal: bob_principal,
        password_hash: hash_password("bob's password").unwrap(),
        groups: vec![],
        calendar_ids: vec![],
    })
    .await;

    let server = TestServer::spawn_with_directory(dir).await;
    let client = server.client();
    let collection_url = format!("{}/calendars/{}/default/", server.base_url, ALICE);

    client
        .request(reqwest::Method::from_bytes(b"MKCALENDAR").unwrap(), &collection_url)
        .basic_auth(ALICE, Some(ALICE_PASSWORD))
        .body("")
        .send()
        .await
        .unwrap();

    let meeting = "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nPRODID:-//test//test//EN\r\nBEGIN:VEVENT\r\nUID:meeting-1\r\nDTSTAMP:20260101T000000Z\r\nDTSTART:20260301T140000Z\r\nDTEND:20260301T150000Z\r\nSUMMARY:Roadmap review\r\nORGANIZER:mailto:alice@example.org\r\nATTENDEE:mailto:bob@example.org\r\nEND:VEVENT\r\nEND:VCALENDAR\r\n";

    let resp = client
        .put(format!("{}meeting-1.ics", collection_url))
        .basic_auth(ALICE, Some(ALICE_PASSWORD))
        .header("if-none-match", "*")
        .body(meeting)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 201);

    // scheduling delivery runs synchronously as part of the PUT; the message
    // is already in bob's inbox by the time the response comes back
    let inbox = server.store.list_schedule_messages("bob").await.unwrap();
    assert_eq!(inbox.len(), 1);
    assert_eq!(inbox[0].method, store::ItipMethod::Request);
    assert!(inbox[0].raw.contains("UID:meeting-1"));
    assert!(inbox[0].raw.contains("METHOD:REQUEST"));

    server.shutdown();
}

#[tokio::test]
async fn s9_scheduling_put_assigns_and_enforces_schedule_tag() {
    let dir = StaticDirectory::new();
    let alice_principal =
        Principal { email: Some("alice@example.org".into()), ..Principal::new(ALICE, "uid=alice,dc=example") };
    dir.add_user(StaticUser {
        principal: alice_principal,
        password_hash: hash_password(ALICE_PASSWORD).unwrap(),
        groups: vec![],
        calendar_ids: vec!["default".into()],
    })
    .await;
    let bob_principal =
        Principal { email: Some("bob@example.org".into()), ..Principal::new("bob", "uid=bob,dc=example") };
    dir.add_user(StaticUser {
        principal: bob_principal,
        password_hash: hash_password("bob's password").unwrap(),
        groups: vec![],
        calendar_ids: vec![],
    })
    .await;

    let server = TestServer::spawn_with_directory(dir).await;
    let client = server.client();
    let collection_url = format!("{}/calendars/{}/default/", server.base_url, ALICE);

    client
        .request(reqwest::Method::from_bytes(b"MKCALENDAR").unwrap(), &collection_url)
        .basic_auth(ALICE, Some(ALICE_PASSWORD))
        .body("")
        .send()
        .await
        .unwrap();

    let meeting = "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nPRODID:-//test//test//EN\r\nBEGIN:VEVENT\r\nUID:meeting-2\r\nDTSTAMP:20260101T000000Z\r\nDTSTART:20260301T140000Z\r\nDTEND:20260301T150000Z\r\nSUMMARY:Roadmap review\r\nORGANIZER:mailto:alice@example.org\r\nATTENDEE:mailto:bob@example.org\r\nEND:VEVENT\r\nEND:VCALENDAR\r\n";
    let object_url = format!("{}meeting-2.ics", collection_url);

    let resp = client
        .put(&object_url)
        .basic_auth(ALICE, Some(ALICE_PASSWORD))
        .header("if-none-match", "*")
        .body(meeting)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 201);
    let schedule_tag = resp
        .headers()
        .get("schedule-tag")
        .expect("schedule-tag header on a write that generated scheduling traffic")
        .to_str()
        .unwrap()
        .trim_matches('"')
        .to_string();

    // a stale If-Schedule-Tag-Match is a precondition failure, same family as If-Match/If-None-Match
    let resp = client
        .put(&object_url)
        .basic_auth(ALICE, Some(ALICE_PASSWORD))
        .header("if-schedule-tag-match", "\"not-the-real-tag\"")
        .body(meeting)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 412);

    // the fresh tag from the first PUT is still accepted
    let resp = client
        .put(&object_url)
        .basic_auth(ALICE, Some(ALICE_PASSWORD))
        .header("if-schedule-tag-match", format!("\"{}\"", schedule_tag))
        .body(meeting)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 204);

    server.shutdown();
}

#[tokio::test]
async fn well_known_caldav_redirects_to_base() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::builder().redirect(reqwest::redirect::Policy::none()).build().unwrap();
    let root = server.base_url.trim_end_matches("/dav");

    let resp = client
        .get(format!("{}/.well-known/caldav", root))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 308);
    assert_eq!(resp.headers().get("location").unwrap(), "/dav/");

    server.shutdown();
}
