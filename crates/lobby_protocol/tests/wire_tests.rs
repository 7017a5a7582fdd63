use lobby_domain::{ClientId, DisplayName, MessageId, RoomId};
use lobby_protocol::requests::{GetUpdates, Join, SendMessage, ServerMessage};
use lobby_protocol::responses::{Joined, Updates};
use lobby_protocol::{ChatMessage, DEFAULT_MAX_BODY_SIZE, Event, decode_body, encode_body};
use serde_json::{Value, json};

fn to_value<T: serde::Serialize>(v: &T) -> Value {
	let bytes = encode_body(v).expect("encode");
	serde_json::from_slice(&bytes).expect("valid json")
}

#[test]
fn receive_message_event_shape() {
	let ev = Event::ReceiveMessage(ChatMessage {
		message_id: MessageId(3),
		client_id: ClientId::new("a-1").unwrap(),
		username: DisplayName::new("A").unwrap(),
		message: "hello".to_string(),
		room_id: RoomId::global(),
		timestamp: 1_700_000_000_000,
		is_server_message: false,
	});

	let v = to_value(&ev);
	assert_eq!(v["event"], "receive_message");
	assert_eq!(v["data"]["username"], "A");
	assert_eq!(v["data"]["message"], "hello");
	assert_eq!(v["data"]["roomId"], "global");
	assert_eq!(v["data"]["messageId"], 3);
	assert!(v["data"].get("isServerMessage").is_none());
	assert_eq!(ev.name(), "receive_message");
}

#[test]
fn struct_variant_fields_are_camel_case() {
	let ev = Event::UserTyping {
		client_id: ClientId::new("c").unwrap(),
		username: DisplayName::new("C").unwrap(),
		room_id: RoomId::global(),
		is_typing: true,
	};
	let v = to_value(&ev);
	assert_eq!(v, json!({
		"event": "user_typing",
		"data": {"clientId": "c", "username": "C", "roomId": "global", "isTyping": true}
	}));
}

#[test]
fn unit_event_has_no_data() {
	let v = to_value(&Event::ServerActivated);
	assert_eq!(v, json!({"event": "server_activated"}));
}

#[test]
fn event_batch_roundtrips_through_updates() {
	let updates = Updates {
		events: vec![
			Event::Kicked {
				reason: "kicked by moderator".into(),
			},
			Event::RoomDeleted {
				room_id: RoomId::new("dm:a:b").unwrap(),
			},
		],
		server_time: 42,
	};
	let bytes = encode_body(&updates).unwrap();
	let back: Updates = decode_body(&bytes, DEFAULT_MAX_BODY_SIZE).unwrap();
	assert_eq!(back, updates);
	assert!(back.events[0].ends_session());
	assert!(!back.events[1].ends_session());
}

#[test]
fn join_accepts_username_alias() {
	let a: Join = decode_body(br#"{"displayName":"alice"}"#, DEFAULT_MAX_BODY_SIZE).unwrap();
	let b: Join = decode_body(br#"{"username":"alice"}"#, DEFAULT_MAX_BODY_SIZE).unwrap();
	assert_eq!(a.display_name, b.display_name);
	assert!(decode_body::<Join>(br#"{"displayName":""}"#, DEFAULT_MAX_BODY_SIZE).is_err());
}

#[test]
fn send_message_accepts_payload_alias() {
	let m: SendMessage = decode_body(
		br#"{"clientId":"c1","roomId":"global","payload":"b64blob"}"#,
		DEFAULT_MAX_BODY_SIZE,
	)
	.unwrap();
	assert_eq!(m.message, "b64blob");
	assert!(decode_body::<SendMessage>(br#"{"clientId":"c1","message":"x"}"#, DEFAULT_MAX_BODY_SIZE).is_err());
}

#[test]
fn get_updates_last_event_time_is_optional() {
	let g: GetUpdates = decode_body(br#"{"clientId":"c1"}"#, DEFAULT_MAX_BODY_SIZE).unwrap();
	assert_eq!(g.last_event_time, None);
	let g: GetUpdates = decode_body(br#"{"clientId":"c1","lastEventTime":17}"#, DEFAULT_MAX_BODY_SIZE).unwrap();
	assert_eq!(g.last_event_time, Some(17));
}

#[test]
fn joined_omits_absent_ids() {
	let j = Joined {
		client_id: None,
		pending_id: Some(ClientId::new("p1").unwrap()),
		server_time: 5,
		recent_messages: Vec::new(),
		members: Vec::new(),
	};
	assert_eq!(to_value(&j), json!({"pendingId": "p1", "serverTime": 5}));
}

#[test]
fn server_message_flag_and_default_room() {
	let ev = Event::ReceiveMessage(ChatMessage {
		message_id: MessageId(9),
		client_id: ClientId::new("m").unwrap(),
		username: DisplayName::new("SERVER").unwrap(),
		message: "maintenance at noon".to_string(),
		room_id: RoomId::global(),
		timestamp: 1,
		is_server_message: true,
	});
	assert_eq!(to_value(&ev)["data"]["isServerMessage"], true);

	let req: ServerMessage = decode_body(br#"{"clientId":"m","message":"hi"}"#, DEFAULT_MAX_BODY_SIZE).unwrap();
	assert!(req.room_id.is_global());
}
