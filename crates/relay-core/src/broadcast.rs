//! Broadcast fan-out engine.
//!
//! One payload, many destinations, one attempt each. Per-destination failures are
//! captured into the report and never stop the loop.

use std::{future::Future, pin::Pin, sync::Arc};

use crate::{
    domain::{ChatId, UserId},
    payload::{FormattedText, Payload, FALLBACK_PLACEHOLDER},
    registry::{ChannelRegistry, Destination, RegistryError, Verification},
    transport::Transport,
    Result,
};

pub type SendFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

/// Fixed body used by the operator's `/test` command.
pub const TEST_MESSAGE: &str = "🧪 Test Message\nThis is a test broadcast from the bot.";

/// [`TEST_MESSAGE`] with its headline in bold.
pub fn test_payload() -> Payload {
    // Offsets are UTF-16 code units: the emoji takes two, then a space.
    Payload::Text(FormattedText::new(
        TEST_MESSAGE,
        vec![serde_json::json!({"type": "bold", "offset": 3, "length": 12})],
    ))
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeliveryOutcome {
    pub destination_id: ChatId,
    pub display_name: String,
    pub ok: bool,
    pub error: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Failed deliveries in registry order.
    pub failures: Vec<DeliveryOutcome>,
}

impl BroadcastReport {
    /// True when there was nothing to deliver to.
    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }

    /// First `limit` failures and how many were left out.
    pub fn failure_preview(&self, limit: usize) -> (&[DeliveryOutcome], usize) {
        let shown = self.failures.len().min(limit);
        (&self.failures[..shown], self.failures.len() - shown)
    }

    fn record(&mut self, outcome: DeliveryOutcome) {
        if outcome.ok {
            self.succeeded += 1;
        } else {
            self.failed += 1;
            self.failures.push(outcome);
        }
    }
}

/// Deliver `payload` to every destination, in order, exactly once each.
pub async fn broadcast<F>(payload: &Payload, destinations: &[Destination], send: F) -> BroadcastReport
where
    F: for<'a> FnMut(&'a Destination, &'a Payload) -> SendFuture<'a>,
{
    broadcast_with_progress(payload, destinations, send, |_, _| {}).await
}

/// Like [`broadcast`], calling `on_progress(attempted, total)` after each attempt.
pub async fn broadcast_with_progress<F, P>(
    payload: &Payload,
    destinations: &[Destination],
    mut send: F,
    mut on_progress: P,
) -> BroadcastReport
where
    F: for<'a> FnMut(&'a Destination, &'a Payload) -> SendFuture<'a>,
    P: FnMut(usize, usize),
{
    let mut report = BroadcastReport {
        total: destinations.len(),
        ..BroadcastReport::default()
    };
    if destinations.is_empty() {
        return report;
    }

    for (idx, dest) in destinations.iter().enumerate() {
        let outcome = match send(dest, payload).await {
            Ok(()) => DeliveryOutcome {
                destination_id: dest.id,
                display_name: dest.display_name.clone(),
                ok: true,
                error: None,
            },
            Err(e) => {
                let detail = e.detail();
                tracing::warn!(
                    channel = %dest.display_name,
                    chat_id = dest.id.0,
                    error = %detail,
                    "broadcast delivery failed"
                );
                DeliveryOutcome {
                    destination_id: dest.id,
                    display_name: dest.display_name.clone(),
                    ok: false,
                    error: Some(detail),
                }
            }
        };
        report.record(outcome);
        on_progress(idx + 1, report.total);
    }

    report
}

/// Map a payload onto the matching transport primitive.
///
/// Captions travel with their own entities; kinds that cannot carry a caption
/// drop it. Unsupported payloads fall back to a text message.
pub async fn deliver(transport: &dyn Transport, dest: &Destination, payload: &Payload) -> Result<()> {
    match payload {
        Payload::Text(text) => transport.send_text(dest.id, text).await,
        Payload::Media(item) => {
            let caption = if item.kind.accepts_caption() {
                item.caption.as_ref().filter(|c| !c.is_blank())
            } else {
                None
            };
            transport
                .send_media(dest.id, item.kind, &item.file_id, caption)
                .await
        }
        Payload::Unsupported { caption } => match caption {
            Some(c) if !c.is_blank() => transport.send_text(dest.id, c).await,
            _ => {
                transport
                    .send_text(dest.id, &FormattedText::plain(FALLBACK_PLACEHOLDER))
                    .await
            }
        },
    }
}

/// Registry + transport, as used by the command layer.
#[derive(Clone)]
pub struct Broadcaster {
    transport: Arc<dyn Transport>,
    registry: Arc<ChannelRegistry>,
}

impl Broadcaster {
    pub fn new(transport: Arc<dyn Transport>, registry: Arc<ChannelRegistry>) -> Self {
        Self {
            transport,
            registry,
        }
    }

    /// Resolve `token`, check the bot can post there, then register it.
    pub async fn add_destination(
        &self,
        token: &str,
        operator: UserId,
    ) -> std::result::Result<Destination, RegistryError> {
        let transport = self.transport.clone();
        self.registry
            .add(token, operator, |ident| async move {
                let meta = transport
                    .resolve_chat(&ident)
                    .await
                    .map_err(|e| RegistryError::Resolution(e.detail()))?;
                let role = transport
                    .membership_role(meta.id, transport.self_id())
                    .await
                    .map_err(|e| RegistryError::Resolution(e.detail()))?;
                Ok(Verification { meta, role })
            })
            .await
    }

    pub async fn remove_destination(
        &self,
        token: &str,
    ) -> std::result::Result<Destination, RegistryError> {
        self.registry.remove_by_handle_or_id(token).await
    }

    pub async fn remove_by_id(&self, id: ChatId) -> std::result::Result<Destination, RegistryError> {
        self.registry.remove(id).await
    }

    pub async fn clear_all(&self) -> usize {
        self.registry.clear().await
    }

    pub async fn list_destinations(&self) -> Vec<Destination> {
        self.registry.list().await
    }

    pub async fn count(&self) -> usize {
        self.registry.count().await
    }

    pub async fn broadcast(&self, payload: &Payload) -> BroadcastReport {
        self.broadcast_with_progress(payload, |_, _| {}).await
    }

    /// Broadcast to a snapshot of the registry taken before the first send.
    pub async fn broadcast_with_progress<P>(&self, payload: &Payload, on_progress: P) -> BroadcastReport
    where
        P: FnMut(usize, usize),
    {
        let snapshot = self.registry.list().await;
        let transport = self.transport.clone();
        broadcast_with_progress(
            payload,
            &snapshot,
            move |dest, payload| {
                let transport = transport.clone();
                Box::pin(async move { deliver(transport.as_ref(), dest, payload).await })
            },
            on_progress,
        )
        .await
    }

    pub async fn test_broadcast<P>(&self, on_progress: P) -> BroadcastReport
    where
        P: FnMut(usize, usize),
    {
        self.broadcast_with_progress(&test_payload(), on_progress).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::Utc;

    use super::*;
    use crate::{
        errors::Error,
        payload::MediaKind,
        transport::{ChatIdentifier, ChatMeta, Role},
    };

    fn dest(id: i64, name: &str) -> Destination {
        Destination {
            id: ChatId(id),
            display_name: name.to_string(),
            handle: None,
            registered_by: UserId(1),
            registered_at: Utc::now(),
        }
    }

    fn dests(n: i64) -> Vec<Destination> {
        (1..=n).map(|i| dest(-i, &format!("chan{i}"))).collect()
    }

    #[tokio::test]
    async fn empty_destinations_never_call_send() {
        let mut calls = 0usize;
        let report = broadcast(&Payload::text("hi"), &[], |_, _| {
            calls += 1;
            Box::pin(async { Ok(()) })
        })
        .await;
        assert_eq!(calls, 0);
        assert!(report.is_empty());
        assert_eq!(report, BroadcastReport::default());
    }

    #[tokio::test]
    async fn failures_at_positions_two_and_five_are_reported_in_order() {
        let targets = dests(5);
        let report = broadcast(&Payload::text("hi"), &targets, |d, _| {
            let fail = d.id == ChatId(-2) || d.id == ChatId(-5);
            Box::pin(async move {
                if fail {
                    Err(Error::External("Forbidden: bot was blocked".to_string()))
                } else {
                    Ok(())
                }
            })
        })
        .await;

        assert_eq!(report.total, 5);
        assert_eq!(report.succeeded, 3);
        assert_eq!(report.failed, 2);
        assert_eq!(report.succeeded + report.failed, report.total);
        let ids: Vec<ChatId> = report.failures.iter().map(|o| o.destination_id).collect();
        assert_eq!(ids, vec![ChatId(-2), ChatId(-5)]);
        assert!(report.failures.iter().all(|o| !o.ok));
        assert_eq!(
            report.failures[0].error.as_deref(),
            Some("Forbidden: bot was blocked")
        );
        assert_eq!(report.failures[0].display_name, "chan2");
    }

    #[tokio::test]
    async fn a_failing_destination_does_not_stop_later_ones() {
        let targets = vec![dest(-1, "A"), dest(-2, "B"), dest(-3, "C")];
        let mut seen: Vec<String> = Vec::new();
        let report = broadcast(&Payload::text("hi"), &targets, |d, _| {
            seen.push(d.display_name.clone());
            let fail = d.display_name == "B";
            Box::pin(async move {
                if fail {
                    Err(Error::External("chat not found".to_string()))
                } else {
                    Ok(())
                }
            })
        })
        .await;

        assert_eq!(seen, vec!["A", "B", "C"]);
        assert_eq!(seen.iter().filter(|n| *n == "C").count(), 1);
        assert_eq!(report.succeeded, 2);
        assert_eq!(report.failed, 1);
    }

    #[tokio::test]
    async fn progress_reports_every_attempt() {
        let targets = dests(3);
        let mut progress = Vec::new();
        broadcast_with_progress(
            &Payload::text("hi"),
            &targets,
            |_, _| Box::pin(async { Ok(()) }),
            |done, total| progress.push((done, total)),
        )
        .await;
        assert_eq!(progress, vec![(1, 3), (2, 3), (3, 3)]);
    }

    #[test]
    fn test_payload_bolds_the_headline() {
        let Payload::Text(body) = test_payload() else {
            panic!("expected text payload");
        };
        assert_eq!(body.text, TEST_MESSAGE);
        let entity = &body.entities[0];
        assert_eq!(entity["type"], "bold");

        let units: Vec<u16> = body.text.encode_utf16().collect();
        let start = entity["offset"].as_u64().unwrap() as usize;
        let len = entity["length"].as_u64().unwrap() as usize;
        assert_eq!(
            String::from_utf16(&units[start..start + len]).unwrap(),
            "Test Message"
        );
    }

    #[test]
    fn failure_preview_caps_and_counts_remainder() {
        let mut report = BroadcastReport {
            total: 8,
            ..BroadcastReport::default()
        };
        for i in 0..8 {
            report.record(DeliveryOutcome {
                destination_id: ChatId(-i),
                display_name: format!("c{i}"),
                ok: false,
                error: Some("x".to_string()),
            });
        }
        let (shown, more) = report.failure_preview(5);
        assert_eq!(shown.len(), 5);
        assert_eq!(more, 3);
        assert_eq!(shown[0].display_name, "c0");

        let (shown, more) = report.failure_preview(10);
        assert_eq!(shown.len(), 8);
        assert_eq!(more, 0);
    }

    #[derive(Clone, Debug, PartialEq)]
    enum Sent {
        Text(ChatId, FormattedText),
        Media(ChatId, MediaKind, String, Option<FormattedText>),
    }

    #[derive(Default)]
    struct FakeTransport {
        chats: Vec<(ChatMeta, Role)>,
        failing: Vec<ChatId>,
        sent: Mutex<Vec<Sent>>,
    }

    impl FakeTransport {
        fn sent(&self) -> Vec<Sent> {
            self.sent.lock().unwrap().clone()
        }

        fn check(&self, chat_id: ChatId) -> Result<()> {
            if self.failing.contains(&chat_id) {
                return Err(Error::External("Bad Request: chat not found".to_string()));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl Transport for FakeTransport {
        fn self_id(&self) -> UserId {
            UserId(999)
        }

        async fn resolve_chat(&self, ident: &ChatIdentifier) -> Result<ChatMeta> {
            self.chats
                .iter()
                .map(|(m, _)| m)
                .find(|m| match ident {
                    ChatIdentifier::Id(id) => m.id == *id,
                    ChatIdentifier::Username(u) => m.username.as_deref() == Some(u.as_str()),
                })
                .cloned()
                .ok_or_else(|| Error::External("Bad Request: chat not found".to_string()))
        }

        async fn membership_role(&self, chat_id: ChatId, user_id: UserId) -> Result<Role> {
            assert_eq!(user_id, UserId(999));
            Ok(self
                .chats
                .iter()
                .find(|(m, _)| m.id == chat_id)
                .map(|(_, r)| *r)
                .unwrap_or(Role::None))
        }

        async fn send_text(&self, chat_id: ChatId, text: &FormattedText) -> Result<()> {
            self.check(chat_id)?;
            self.sent
                .lock()
                .unwrap()
                .push(Sent::Text(chat_id, text.clone()));
            Ok(())
        }

        async fn send_media(
            &self,
            chat_id: ChatId,
            kind: MediaKind,
            file_id: &str,
            caption: Option<&FormattedText>,
        ) -> Result<()> {
            self.check(chat_id)?;
            self.sent.lock().unwrap().push(Sent::Media(
                chat_id,
                kind,
                file_id.to_string(),
                caption.cloned(),
            ));
            Ok(())
        }
    }

    fn meta(id: i64, title: &str, username: Option<&str>) -> ChatMeta {
        ChatMeta {
            id: ChatId(id),
            title: title.to_string(),
            username: username.map(|s| s.to_string()),
        }
    }

    #[tokio::test]
    async fn deliver_maps_payload_kinds() {
        let t = FakeTransport::default();
        let d = dest(-1, "A");
        let bold = serde_json::json!({"type": "bold", "offset": 0, "length": 3});
        let caption = FormattedText::new("cap", vec![bold.clone()]);

        deliver(&t, &d, &Payload::Text(FormattedText::new("hey", vec![bold.clone()])))
            .await
            .unwrap();
        deliver(&t, &d, &Payload::media(MediaKind::Photo, "p1", Some(caption.clone())))
            .await
            .unwrap();
        deliver(&t, &d, &Payload::media(MediaKind::Sticker, "s1", Some(caption.clone())))
            .await
            .unwrap();
        deliver(&t, &d, &Payload::Unsupported { caption: None })
            .await
            .unwrap();
        deliver(&t, &d, &Payload::Unsupported { caption: Some(caption.clone()) })
            .await
            .unwrap();

        assert_eq!(
            t.sent(),
            vec![
                Sent::Text(ChatId(-1), FormattedText::new("hey", vec![bold])),
                Sent::Media(ChatId(-1), MediaKind::Photo, "p1".into(), Some(caption.clone())),
                Sent::Media(ChatId(-1), MediaKind::Sticker, "s1".into(), None),
                Sent::Text(ChatId(-1), FormattedText::plain(FALLBACK_PLACEHOLDER)),
                Sent::Text(ChatId(-1), caption),
            ]
        );
    }

    #[tokio::test]
    async fn blank_caption_is_not_sent() {
        let t = FakeTransport::default();
        deliver(
            &t,
            &dest(-1, "A"),
            &Payload::media(MediaKind::Video, "v", Some(FormattedText::plain("  "))),
        )
        .await
        .unwrap();
        assert_eq!(
            t.sent(),
            vec![Sent::Media(ChatId(-1), MediaKind::Video, "v".into(), None)]
        );
    }

    fn broadcaster(t: FakeTransport) -> (Broadcaster, Arc<FakeTransport>) {
        let t = Arc::new(t);
        let b = Broadcaster::new(t.clone(), Arc::new(ChannelRegistry::new()));
        (b, t)
    }

    #[tokio::test]
    async fn add_destination_checks_admin_role() {
        let (b, _) = broadcaster(FakeTransport {
            chats: vec![
                (meta(-100, "News", Some("news")), Role::Administrator),
                (meta(-200, "Lurk", None), Role::Member),
            ],
            ..FakeTransport::default()
        });

        let added = b.add_destination("@news", UserId(1)).await.unwrap();
        assert_eq!(added.id, ChatId(-100));
        assert_eq!(added.handle.as_deref(), Some("news"));

        let err = b.add_destination("-200", UserId(1)).await.unwrap_err();
        assert_eq!(
            err,
            RegistryError::NotAdmin {
                title: "Lurk".to_string(),
                role: Role::Member
            }
        );

        let err = b.add_destination("@ghost", UserId(1)).await.unwrap_err();
        assert_eq!(
            err,
            RegistryError::Resolution("Bad Request: chat not found".to_string())
        );

        let err = b.add_destination("-100", UserId(1)).await.unwrap_err();
        assert!(matches!(err, RegistryError::AlreadyRegistered { .. }));
        assert_eq!(b.count().await, 1);
    }

    #[tokio::test]
    async fn broadcaster_delivers_to_registry_snapshot() {
        let (b, t) = broadcaster(FakeTransport {
            chats: vec![
                (meta(-1, "A", Some("a")), Role::Administrator),
                (meta(-2, "B", None), Role::Owner),
                (meta(-3, "C", None), Role::Administrator),
            ],
            failing: vec![ChatId(-2)],
            ..FakeTransport::default()
        });
        for token in ["@a", "-2", "-3"] {
            b.add_destination(token, UserId(1)).await.unwrap();
        }

        let mut progress = Vec::new();
        let report = b.test_broadcast(|done, total| progress.push((done, total))).await;
        assert_eq!(progress, vec![(1, 3), (2, 3), (3, 3)]);
        assert_eq!(report.total, 3);
        assert_eq!(report.succeeded, 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].destination_id, ChatId(-2));
        assert_eq!(
            report.failures[0].error.as_deref(),
            Some("Bad Request: chat not found")
        );

        let texts: Vec<ChatId> = t
            .sent()
            .into_iter()
            .map(|s| match s {
                Sent::Text(id, body) => {
                    assert_eq!(Payload::Text(body), test_payload());
                    id
                }
                Sent::Media(id, ..) => id,
            })
            .collect();
        assert_eq!(texts, vec![ChatId(-1), ChatId(-3)]);

        b.remove_destination("@a").await.unwrap();
        assert_eq!(b.clear_all().await, 2);
        assert!(b.broadcast(&Payload::text("x")).await.is_empty());
    }

    /// Transport that empties the registry it delivers for on every send.
    struct MutatingTransport {
        registry: Arc<ChannelRegistry>,
        sent: Mutex<Vec<ChatId>>,
    }

    #[async_trait]
    impl Transport for MutatingTransport {
        fn self_id(&self) -> UserId {
            UserId(999)
        }

        async fn resolve_chat(&self, ident: &ChatIdentifier) -> Result<ChatMeta> {
            match ident {
                ChatIdentifier::Id(id) => Ok(meta(id.0, &format!("chan{}", -id.0), None)),
                ChatIdentifier::Username(_) => Err(Error::External("chat not found".into())),
            }
        }

        async fn membership_role(&self, _chat_id: ChatId, _user_id: UserId) -> Result<Role> {
            Ok(Role::Administrator)
        }

        async fn send_text(&self, chat_id: ChatId, _text: &FormattedText) -> Result<()> {
            let _ = self.registry.remove(ChatId(-3)).await;
            self.registry.clear().await;
            self.sent.lock().unwrap().push(chat_id);
            Ok(())
        }

        async fn send_media(
            &self,
            chat_id: ChatId,
            _kind: MediaKind,
            _file_id: &str,
            _caption: Option<&FormattedText>,
        ) -> Result<()> {
            self.sent.lock().unwrap().push(chat_id);
            Ok(())
        }
    }

    #[tokio::test]
    async fn registry_changes_mid_broadcast_do_not_change_attempts() {
        let registry = Arc::new(ChannelRegistry::new());
        let t = Arc::new(MutatingTransport {
            registry: registry.clone(),
            sent: Mutex::new(Vec::new()),
        });
        let b = Broadcaster::new(t.clone(), registry.clone());
        for token in ["-1", "-2", "-3"] {
            b.add_destination(token, UserId(1)).await.unwrap();
        }

        let report = b.broadcast(&Payload::text("hi")).await;

        assert_eq!(report.total, 3);
        assert_eq!(report.succeeded, 3);
        assert!(report.failures.is_empty());
        assert_eq!(
            *t.sent.lock().unwrap(),
            vec![ChatId(-1), ChatId(-2), ChatId(-3)]
        );
        assert_eq!(registry.count().await, 0);
    }
}
