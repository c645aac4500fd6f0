//! The shared root: the rich sequence a document tree is mirrored into.

use duet_editor::Node;
use yrs::updates::decoder::Decode;
use yrs::updates::encoder::Encode;
use yrs::{
    Doc, OffsetKind, Options, ReadTxn, StateVector, Transact, Update, XmlFragment, XmlOut,
    XmlTextPrelim, XmlTextRef,
};

use crate::delta::{nodes_to_insert_delta, sequence_to_children, write_delta};
use crate::error::{Result, SyncError};
use crate::location::sequence_length;

/// A CRDT document whose offsets are counted in UTF-8 bytes, matching the
/// string offsets of the editor.
pub fn new_doc() -> Doc {
    Doc::with_options(Options {
        offset_kind: OffsetKind::Bytes,
        ..Options::default()
    })
}

#[derive(Clone)]
pub struct SharedRoot {
    doc: Doc,
    root: XmlTextRef,
    name: String,
}

impl std::fmt::Debug for SharedRoot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedRoot")
            .field("name", &self.name)
            .field("client_id", &self.doc.client_id())
            .finish()
    }
}

impl SharedRoot {
    /// Open an existing shared root. The root sequence is the first child of
    /// the XML fragment `name`.
    pub fn open(doc: Doc, name: &str) -> Result<Self> {
        let fragment = doc.get_or_insert_xml_fragment(name);
        let root = {
            let txn = doc.transact();
            match fragment.get(&txn, 0) {
                Some(XmlOut::Text(root)) => root,
                Some(_) => {
                    return Err(SyncError::UnexpectedTarget(format!(
                        "first child of {name} is not a text sequence"
                    )))
                }
                None => return Err(SyncError::MissingRoot(name.to_string())),
            }
        };
        Ok(Self {
            doc,
            root,
            name: name.to_string(),
        })
    }

    /// Open the shared root, creating it when the document does not have one
    /// yet. Only one replica should bootstrap; others receive the root through
    /// an update and [`SharedRoot::open`] it.
    pub fn bootstrap(doc: Doc, name: &str) -> Result<Self> {
        let fragment = doc.get_or_insert_xml_fragment(name);
        {
            let mut txn = doc.transact_mut();
            if fragment.len(&txn) == 0 {
                fragment.insert(&mut txn, 0, XmlTextPrelim::new(""));
                tracing::debug!(name, "created shared root");
            }
        }
        Self::open(doc, name)
    }

    pub fn doc(&self) -> &Doc {
        &self.doc
    }

    pub fn root(&self) -> &XmlTextRef {
        &self.root
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Replace the whole shared content with `nodes`.
    pub fn load_nodes(&self, nodes: &[Node]) -> Result<()> {
        let mut txn = self.doc.transact_mut();
        let len = sequence_length(&txn, &self.root);
        if len > 0 {
            yrs::Text::remove_range(&self.root, &mut txn, 0, len);
        }
        write_delta(&mut txn, &self.root, 0, &nodes_to_insert_delta(nodes))
    }

    /// Current shared content as tree nodes.
    pub fn to_nodes(&self) -> Vec<Node> {
        let txn = self.doc.transact();
        sequence_to_children(&txn, &self.root)
    }

    pub fn state_vector(&self) -> Vec<u8> {
        self.doc.transact().state_vector().encode_v1()
    }

    /// Everything the holder of `state_vector` is missing. An empty vector
    /// means the full state.
    pub fn encode_state_as_update(&self, state_vector: &[u8]) -> Result<Vec<u8>> {
        let sv = if state_vector.is_empty() {
            StateVector::default()
        } else {
            StateVector::decode_v1(state_vector).map_err(|e| SyncError::Decode(e.to_string()))?
        };
        Ok(self.doc.transact().encode_state_as_update_v1(&sv))
    }

    pub fn encode_state(&self) -> Vec<u8> {
        self.doc
            .transact()
            .encode_state_as_update_v1(&StateVector::default())
    }

    /// Apply an encoded v1 update under `origin`.
    pub fn apply_update(&self, update: &[u8], origin: &str) -> Result<()> {
        let update = Update::decode_v1(update).map_err(|e| SyncError::Decode(e.to_string()))?;
        let mut txn = self.doc.transact_mut_with(origin);
        txn.apply_update(update)
            .map_err(|e| SyncError::Apply(e.to_string()))
    }
}
