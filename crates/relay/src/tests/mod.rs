//! Szenario-Tests fuer den Verbindungs-Lifecycle (In-Memory-Transport)

mod lifecycle_tests;
