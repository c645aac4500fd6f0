//! Change events captured inside the CRDT observer.
//!
//! The observer only sees the document while the transaction commits, so
//! everything translation needs later is copied out there: where the changed
//! sequence sits, which attributes changed and the change delta with inserted
//! embeds already converted to elements.

use duet_editor::{Element, Node, Properties, Text as TextNode};
use serde_json::Value;
use std::sync::{Arc, Mutex};
use yrs::types::{Delta, EntryChange, Event, Events};
use yrs::{Any, DeepObservable, Origin, Out, Subscription, TransactionMut, XmlTextRef};

use crate::convert::{attrs_to_properties, out_to_json};
use crate::delta::sequence_to_element;
use crate::error::{Result, SyncError};
use crate::location::sequence_hops;

/// Content of an insert step
#[derive(Debug, Clone, PartialEq)]
pub enum InsertContent {
    Text { text: String, attributes: Properties },
    Element(Element),
}

impl InsertContent {
    pub fn to_node(&self) -> Node {
        match self {
            InsertContent::Text { text, attributes } => Node::Text(TextNode {
                text: text.clone(),
                properties: attributes.clone(),
            }),
            InsertContent::Element(element) => Node::Element(element.clone()),
        }
    }
}

/// One step of a change delta
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeStep {
    Retain {
        length: u32,
        /// Formatting applied to the retained range
        attributes: Option<Properties>,
    },
    Delete(u32),
    Insert(InsertContent),
}

/// A change to one sequence
#[derive(Debug, Clone, PartialEq)]
pub struct SequenceEvent {
    /// Embed offsets from the shared root down to the changed sequence;
    /// `None` when the sequence was deleted in the same transaction
    pub target: Option<Vec<u32>>,
    /// Changed attributes with their new value, `None` when removed
    pub keys: Vec<(String, Option<Value>)>,
    pub delta: Vec<ChangeStep>,
}

/// Events of one committed transaction
#[derive(Debug)]
pub struct CapturedTransaction {
    pub origin: Option<Origin>,
    pub events: Result<Vec<SequenceEvent>>,
}

pub type Inbox = Arc<Mutex<Vec<CapturedTransaction>>>;

/// Copy the events of a committing transaction. Parents come before their
/// descendants.
pub fn capture_events(
    txn: &TransactionMut,
    root: &XmlTextRef,
    events: &Events,
) -> Result<Vec<SequenceEvent>> {
    let mut captured = Vec::new();

    for event in events.iter() {
        let Event::XmlText(event) = event else {
            return Err(SyncError::UnexpectedTarget(
                "change event on a shared type other than a text sequence".into(),
            ));
        };

        let target = sequence_hops(txn, root, event.target())?;

        let mut keys: Vec<(String, Option<Value>)> = event
            .keys(txn)
            .iter()
            .map(|(key, change)| {
                let value = match change {
                    EntryChange::Inserted(value) | EntryChange::Updated(_, value) => {
                        Some(out_to_json(value))
                    }
                    EntryChange::Removed(_) => None,
                };
                (key.to_string(), value)
            })
            .collect();
        keys.sort_by(|a, b| a.0.cmp(&b.0));

        let delta = event
            .delta(txn)
            .iter()
            .map(|step| capture_step(txn, step))
            .collect::<Result<Vec<_>>>()?;

        captured.push(SequenceEvent {
            target,
            keys,
            delta,
        });
    }

    captured.sort_by_key(|event| event.target.as_ref().map_or(0, Vec::len));
    Ok(captured)
}

fn capture_step(txn: &TransactionMut, step: &Delta) -> Result<ChangeStep> {
    Ok(match step {
        Delta::Retain(length, attributes) => ChangeStep::Retain {
            length: *length,
            attributes: attributes.as_deref().map(attrs_to_properties),
        },
        Delta::Deleted(length) => ChangeStep::Delete(*length),
        Delta::Inserted(value, attributes) => {
            let attributes = attributes
                .as_deref()
                .map(attrs_to_properties)
                .unwrap_or_default();
            let content = match value {
                Out::Any(Any::String(text)) => InsertContent::Text {
                    text: text.to_string(),
                    attributes,
                },
                Out::YXmlText(seq) => InsertContent::Element(sequence_to_element(txn, seq)),
                other => {
                    return Err(SyncError::UnexpectedTarget(format!(
                        "unsupported inserted value {other:?}"
                    )))
                }
            };
            ChangeStep::Insert(content)
        }
    })
}

/// Observe the shared root, queueing every committed transaction into the
/// returned inbox.
pub fn observe(root: &XmlTextRef) -> (Subscription, Inbox) {
    let inbox: Inbox = Arc::new(Mutex::new(Vec::new()));
    let sink = inbox.clone();
    let observed = root.clone();

    let subscription = root.observe_deep(move |txn, events| {
        let captured = CapturedTransaction {
            origin: txn.origin().cloned(),
            events: capture_events(txn, &observed, events),
        };
        match sink.lock() {
            Ok(mut queue) => queue.push(captured),
            Err(_) => tracing::error!("event inbox poisoned, dropping transaction"),
        }
    });

    (subscription, inbox)
}

/// Take everything queued so far.
pub fn drain(inbox: &Inbox) -> Vec<CapturedTransaction> {
    match inbox.lock() {
        Ok(mut queue) => std::mem::take(&mut *queue),
        Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
    }
}
