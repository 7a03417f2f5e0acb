//! Tests fuer die Viewer-Aushandlung

use onair_core::ConnectionId;
use onair_media::MediaError;

use super::fake_gateway::Aufruf;
use super::{aufbau, raum};
use crate::error::Rejection;

#[tokio::test]
async fn viewer_ohne_presenter_erzeugt_nichts() {
    let t = aufbau();
    let room = raum("leer");

    let ergebnis = t
        .controller
        .start_viewing(ConnectionId::new(), &room, "offer")
        .await;

    assert!(matches!(ergebnis, Err(Rejection::NoActivePresenter)));
    assert_eq!(t.gateway.erzeugt(), 0);
    assert_eq!(t.registry.get(&room).unwrap().lock().viewer_anzahl(), 0);
}

#[tokio::test]
async fn viewer_wird_mit_presenter_verbunden() {
    let t = aufbau();
    let room = raum("lobby");
    let presenter = ConnectionId::new();
    let viewer = ConnectionId::new();

    let presenter_ep = t.presenter(presenter, &room).await;
    let antwort = t
        .controller
        .start_viewing(viewer, &room, "viewer-offer")
        .await
        .expect("Viewer muss akzeptiert werden");
    assert_eq!(antwort, "answer-for:viewer-offer");

    let viewer_ep = t
        .registry
        .get(&room)
        .unwrap()
        .lock()
        .viewer(&viewer)
        .and_then(|v| v.endpunkt_id().cloned())
        .expect("Viewer-Endpunkt");
    assert_eq!(t.gateway.verbindungen(), vec![(presenter_ep, viewer_ep)]);
    assert_eq!(t.gateway.aktive_objekte(), 3);
    assert_eq!(t.metriken.viewers_active.get(), 1);
}

#[tokio::test]
async fn viewer_waehrend_presenter_aushandlung_wird_abgelehnt() {
    let t = aufbau();
    let room = raum("lobby");
    let presenter = ConnectionId::new();

    let gate = t.gateway.anhalten(Aufruf::CreateEndpoint);
    let controller = t.controller.clone();
    let room_p = room.clone();
    let aufgabe =
        tokio::spawn(async move { controller.start_presenting(presenter, &room_p, "offer").await });
    gate.erreicht().await;

    let ergebnis = t
        .controller
        .start_viewing(ConnectionId::new(), &room, "offer")
        .await;
    assert!(matches!(ergebnis, Err(Rejection::NoActivePresenter)));
    assert_eq!(t.gateway.erzeugt(), 1, "Nur die Pipeline des Presenters");

    gate.freigeben();
    assert!(aufgabe.await.unwrap().is_ok());
}

#[tokio::test]
async fn presenter_kann_nicht_eigener_viewer_sein() {
    let t = aufbau();
    let room = raum("lobby");
    let conn = ConnectionId::new();

    t.presenter(conn, &room).await;
    let ergebnis = t.controller.start_viewing(conn, &room, "offer").await;

    assert!(matches!(ergebnis, Err(Rejection::AlreadyPresenting)));
    assert!(t.registry.get(&room).unwrap().lock().presenter_bereit());
}

#[tokio::test]
async fn presenter_geht_waehrend_viewer_aushandlung() {
    let t = aufbau();
    let room = raum("lobby");
    let presenter = ConnectionId::new();
    let viewer = ConnectionId::new();
    t.presenter(presenter, &room).await;

    let gate = t.gateway.anhalten(Aufruf::Connect);
    let controller = t.controller.clone();
    let room_v = room.clone();
    let aufgabe =
        tokio::spawn(async move { controller.start_viewing(viewer, &room_v, "offer").await });
    gate.erreicht().await;

    t.controller.stop(presenter, &room).await;
    gate.freigeben();

    assert!(matches!(
        aufgabe.await.unwrap(),
        Err(Rejection::NoActivePresenter)
    ));
    assert_eq!(t.gateway.aktive_objekte(), 0);
    assert_eq!(t.registry.get(&room).unwrap().lock().viewer_anzahl(), 0);
}

#[tokio::test]
async fn viewer_endpunkt_einer_veralteten_aushandlung_wird_freigegeben() {
    let t = aufbau();
    let room = raum("lobby");
    let presenter = ConnectionId::new();
    let viewer = ConnectionId::new();
    t.presenter(presenter, &room).await;

    let gate = t.gateway.anhalten(Aufruf::CreateEndpoint);
    let controller = t.controller.clone();
    let room_v = room.clone();
    let aufgabe =
        tokio::spawn(async move { controller.start_viewing(viewer, &room_v, "offer").await });
    gate.erreicht().await;

    // Nur der Viewer geht, der Presenter bleibt
    t.controller.stop(viewer, &room).await;
    gate.freigeben();

    assert!(matches!(
        aufgabe.await.unwrap(),
        Err(Rejection::NoActivePresenter)
    ));
    assert_eq!(t.gateway.aktive_objekte(), 2, "Presenter-Objekte bleiben");
    assert_eq!(t.gateway.freigegebene_endpunkte(), 1);
    assert!(t.registry.get(&room).unwrap().lock().presenter_bereit());
}

#[tokio::test]
async fn fehler_bei_connect_entfernt_nur_den_viewer() {
    let t = aufbau();
    let room = raum("lobby");
    let presenter = ConnectionId::new();
    let viewer = ConnectionId::new();
    t.presenter(presenter, &room).await;

    t.gateway.fehlschlagen(
        Aufruf::Connect,
        MediaError::Rpc {
            code: 40101,
            message: "Object not found".into(),
        },
    );
    let ergebnis = t.controller.start_viewing(viewer, &room, "offer").await;

    assert!(matches!(ergebnis, Err(Rejection::BackendFailure(_))));
    let handle = t.registry.get(&room).unwrap();
    assert!(handle.lock().viewer(&viewer).is_none());
    assert!(handle.lock().presenter_bereit());
    assert_eq!(t.gateway.aktive_objekte(), 2);
    assert_eq!(t.metriken.viewers_active.get(), 0);
}

#[tokio::test]
async fn wiederholte_viewer_anfrage_ersetzt_alte_session() {
    let t = aufbau();
    let room = raum("lobby");
    let presenter = ConnectionId::new();
    let viewer = ConnectionId::new();
    t.presenter(presenter, &room).await;

    let erster = t.viewer(viewer, &room).await;
    let zweiter = t.viewer(viewer, &room).await;

    assert_ne!(erster, zweiter);
    assert_eq!(t.registry.get(&room).unwrap().lock().viewer_anzahl(), 1);
    assert_eq!(t.gateway.aktive_objekte(), 3, "Alter Endpunkt freigegeben");
    assert_eq!(t.metriken.viewers_active.get(), 1);
}
