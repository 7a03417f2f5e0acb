//! Tests fuer Pufferung und Weiterleitung von ICE-Kandidaten

use onair_core::ConnectionId;
use onair_protocol::{IceCandidate, ServerEvent};

use super::fake_gateway::Aufruf;
use super::{aufbau, empfangen, raum, warten_bis};

fn kandidat(n: u32) -> IceCandidate {
    let mut c = IceCandidate::neu(format!(
        "candidate:{n} 1 UDP 2122260223 192.168.1.{n} 5{n:04} typ host"
    ));
    c.sdp_mid = Some("0".into());
    c.sdp_m_line_index = Some(0);
    c
}

#[tokio::test]
async fn gepufferte_kandidaten_kommen_in_ankunftsreihenfolge_an() {
    let t = aufbau();
    let room = raum("lobby");
    let conn = ConnectionId::new();

    let gate = t.gateway.anhalten(Aufruf::CreateEndpoint);
    let controller = t.controller.clone();
    let room_c = room.clone();
    let aufgabe =
        tokio::spawn(async move { controller.start_presenting(conn, &room_c, "offer").await });
    gate.erreicht().await;

    for n in 1..=3 {
        t.controller.on_ice_candidate(conn, Some(&room), kandidat(n));
    }
    assert_eq!(t.registry.kandidaten().laenge(&conn), 3);
    assert_eq!(t.metriken.candidates_queued_total.get(), 3);

    gate.freigeben();
    aufgabe.await.unwrap().expect("Presenter muss akzeptiert werden");
    assert!(!t.registry.kandidaten().enthaelt(&conn), "Queue ist geloescht");

    // Spaeterer Kandidat geht direkt an den Endpunkt, hinter die gepufferten
    t.controller.on_ice_candidate(conn, Some(&room), kandidat(4));

    let ep = t.presenter_endpunkt(&room).unwrap();
    warten_bis(|| t.gateway.kandidaten_fuer(&ep).len() == 4).await;
    assert_eq!(
        t.gateway.kandidaten_fuer(&ep),
        vec![kandidat(1), kandidat(2), kandidat(3), kandidat(4)]
    );
}

#[tokio::test]
async fn kandidaten_vor_der_anfrage_werden_verworfen() {
    let t = aufbau();
    let room = raum("lobby");
    let conn = ConnectionId::new();

    t.controller.on_ice_candidate(conn, Some(&room), kandidat(1));
    t.controller.on_ice_candidate(conn, None, kandidat(2));
    assert_eq!(t.registry.kandidaten().laenge(&conn), 2);

    let ep = t.presenter(conn, &room).await;
    t.controller.on_ice_candidate(conn, Some(&room), kandidat(3));

    warten_bis(|| !t.gateway.kandidaten_fuer(&ep).is_empty()).await;
    assert_eq!(t.gateway.kandidaten_fuer(&ep), vec![kandidat(3)]);
}

#[tokio::test]
async fn viewer_kandidaten_gehen_an_den_viewer_endpunkt() {
    let t = aufbau();
    let room = raum("lobby");
    let presenter = ConnectionId::new();
    let viewer = ConnectionId::new();

    let presenter_ep = t.presenter(presenter, &room).await;
    let viewer_ep = t.viewer(viewer, &room).await;

    t.controller.on_ice_candidate(viewer, Some(&room), kandidat(7));
    warten_bis(|| t.gateway.kandidaten_fuer(&viewer_ep).len() == 1).await;
    assert!(t.gateway.kandidaten_fuer(&presenter_ep).is_empty());
}

#[tokio::test]
async fn backend_kandidaten_werden_an_den_client_gesendet() {
    let t = aufbau();
    let room = raum("lobby");
    let conn = ConnectionId::new();
    let mut rx = t.broadcaster.verbindung_registrieren(conn);

    let ep = t.presenter(conn, &room).await;
    assert!(t.gateway.kandidat_melden(&ep, kandidat(9)));

    assert_eq!(
        empfangen(&mut rx).await,
        ServerEvent::IceCandidate {
            candidate: kandidat(9)
        }
    );
}

#[tokio::test]
async fn stop_verwirft_gepufferte_kandidaten() {
    let t = aufbau();
    let room = raum("lobby");
    let conn = ConnectionId::new();

    t.controller.on_ice_candidate(conn, None, kandidat(1));
    assert!(t.registry.kandidaten().enthaelt(&conn));

    t.controller.stop(conn, &room).await;
    assert!(!t.registry.kandidaten().enthaelt(&conn));
}

#[tokio::test]
async fn kandidaten_zwischen_vorbereitung_und_aushandlung_bleiben_erhalten() {
    let t = aufbau();
    let room = raum("lobby");
    let conn = ConnectionId::new();

    t.controller.on_ice_candidate(conn, Some(&room), kandidat(1));
    let aushandlung = t.controller.presenter_vorbereiten(conn, &room);
    assert!(!t.registry.kandidaten().enthaelt(&conn));

    t.controller.on_ice_candidate(conn, Some(&room), kandidat(2));
    t.controller.on_ice_candidate(conn, Some(&room), kandidat(3));
    t.controller
        .aushandeln(aushandlung, "offer")
        .await
        .expect("Presenter muss akzeptiert werden");

    let ep = t.presenter_endpunkt(&room).unwrap();
    warten_bis(|| t.gateway.kandidaten_fuer(&ep).len() == 2).await;
    assert_eq!(t.gateway.kandidaten_fuer(&ep), vec![kandidat(2), kandidat(3)]);
}
