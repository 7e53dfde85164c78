//! Chat-Nachricht – unveraenderliche Nutzlast plus Absender
//!
//! Eine Nachricht existiert nur waehrend des Broadcasts. Der Text liegt als
//! `Arc<str>` vor, damit die Verteilung an viele Empfaenger ohne Kopien
//! auskommt.

use std::sync::Arc;

use crate::types::VerbindungsId;

/// Eine eingegangene Chat-Zeile
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatNachricht {
    /// Verbindung, von der die Nachricht stammt
    pub von: VerbindungsId,
    /// Anzeigename des Absenders (aus dem Handshake)
    pub absender: Arc<str>,
    /// Rohtext wie vom Client gesendet
    pub text: Arc<str>,
}

impl ChatNachricht {
    /// Erstellt eine neue Nachricht
    pub fn neu(von: VerbindungsId, absender: Arc<str>, text: impl Into<Arc<str>>) -> Self {
        Self {
            von,
            absender,
            text: text.into(),
        }
    }

    /// Text mit vorangestelltem Absendernamen (`"alice: hi"`)
    pub fn mit_absender(&self) -> Arc<str> {
        format!("{}: {}", self.absender, self.text).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mit_absender_formatiert_name_und_text() {
        let n = ChatNachricht::neu(VerbindungsId(1), Arc::from("alice"), "hi");
        assert_eq!(&*n.mit_absender(), "alice: hi");
        assert_eq!(&*n.text, "hi");
    }

    #[test]
    fn clone_teilt_den_text() {
        let n = ChatNachricht::neu(VerbindungsId(1), Arc::from("bob"), "hallo");
        let kopie = n.clone();
        assert!(Arc::ptr_eq(&n.text, &kopie.text));
    }
}
