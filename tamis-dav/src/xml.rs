use std::future::Future;

use quick_xml::events::Event;
use quick_xml::name::ResolveResult;
use quick_xml::reader::NsReader;
use tokio::io::AsyncBufRead;

use super::error::ParsingError;

// Namespaces
pub const DAV_URN: &[u8] = b"DAV:";
pub const CAL_URN: &[u8] = b"urn:ietf:params:xml:ns:caldav";

pub trait IRead: AsyncBufRead + Unpin {}
impl<T: AsyncBufRead + Unpin> IRead for T {}

/// Deserialization of one XML node into a Rust value.
///
/// Returning `ParsingError::Recoverable` means "the cursor is not on an
/// element I recognize"; the caller may try another node type or skip.
pub trait QRead<T> {
    fn qread(xml: &mut Reader<impl IRead>) -> impl Future<Output = Result<T, ParsingError>>;
}

pub trait Node<T>: QRead<T> + std::fmt::Debug + PartialEq + Clone {}
impl<T> Node<T> for T where T: QRead<T> + std::fmt::Debug + PartialEq + Clone {}

/// Cursor over an XML event stream.
///
/// `cur` is the event under the cursor, `prev` the one just consumed
/// (attribute reads go through `prev`, see `open`). `parents` tracks
/// opened-but-not-closed elements.
pub struct Reader<T: IRead> {
    pub rdr: NsReader<T>,
    cur: Event<'static>,
    prev: Event<'static>,
    parents: Vec<Event<'static>>,
    buf: Vec<u8>,
}
impl<T: IRead> Reader<T> {
    pub async fn new(mut rdr: NsReader<T>) -> Result<Self, ParsingError> {
        let mut buf: Vec<u8> = vec![];
        let cur = rdr.read_event_into_async(&mut buf).await?.into_owned();
        buf.clear();
        Ok(Self {
            rdr,
            cur,
            prev: Event::Eof,
            parents: vec![],
            buf,
        })
    }

    async fn next(&mut self) -> Result<Event<'static>, ParsingError> {
        let evt = self
            .rdr
            .read_event_into_async(&mut self.buf)
            .await?
            .into_owned();
        self.buf.clear();
        self.prev = std::mem::replace(&mut self.cur, evt);
        Ok(self.prev.clone())
    }

    /// Skip one node at the current level.
    pub async fn skip(&mut self) -> Result<Event<'static>, ParsingError> {
        match &self.cur {
            Event::Start(b) => {
                let _span = self
                    .rdr
                    .read_to_end_into_async(b.to_end().name(), &mut self.buf)
                    .await?;
                self.next().await
            }
            Event::End(_) => Err(ParsingError::WrongToken),
            Event::Eof => Err(ParsingError::Eof),
            _ => self.next().await,
        }
    }

    fn is_tag(&self, ns: &[u8], key: &str) -> bool {
        let qname = match self.peek() {
            Event::Start(bs) | Event::Empty(bs) => bs.name(),
            Event::End(be) => be.name(),
            _ => return false,
        };

        let (extr_ns, local) = self.rdr.resolve_element(qname);

        if local.into_inner() != key.as_bytes() {
            return false;
        }

        match extr_ns {
            ResolveResult::Bound(v) => v.into_inner() == ns,
            _ => false,
        }
    }

    /// An empty element (`<a/>`) has been opened but cannot contain
    /// children; a start element can.
    pub fn parent_has_child(&self) -> bool {
        matches!(self.parents.last(), Some(Event::Start(_)) | None)
    }

    fn ensure_parent_has_child(&self) -> Result<(), ParsingError> {
        match self.parent_has_child() {
            true => Ok(()),
            false => Err(ParsingError::Recoverable),
        }
    }

    pub fn peek(&self) -> &Event<'static> {
        &self.cur
    }

    /// Resolved `{namespace}local` name of the element under the cursor.
    pub fn qualified_name(&self) -> Result<String, ParsingError> {
        let qname = match self.peek() {
            Event::Start(bs) | Event::Empty(bs) => bs.name(),
            _ => return Err(ParsingError::WrongToken),
        };
        let (ns, local) = self.rdr.resolve_element(qname);
        let local = std::str::from_utf8(local.into_inner())?;
        match ns {
            ResolveResult::Bound(ns) => Ok(format!(
                "{{{}}}{}",
                std::str::from_utf8(ns.into_inner())?,
                local
            )),
            _ => Ok(local.into()),
        }
    }

    /// Concatenated text content up to the next structural event.
    pub async fn tag_string(&mut self) -> Result<String, ParsingError> {
        self.ensure_parent_has_child()?;

        let mut acc = String::new();
        loop {
            match self.peek() {
                Event::CData(unescaped) => {
                    acc.push_str(std::str::from_utf8(unescaped.as_ref())?);
                    self.next().await?
                }
                Event::Text(escaped) => {
                    acc.push_str(escaped.unescape()?.as_ref());
                    self.next().await?
                }
                Event::End(_) | Event::Start(_) | Event::Empty(_) => return Ok(acc),
                _ => self.next().await?,
            };
        }
    }

    pub async fn maybe_read<N: Node<N>>(
        &mut self,
        t: &mut Option<N>,
        dirty: &mut bool,
    ) -> Result<(), ParsingError> {
        if !self.parent_has_child() {
            return Ok(());
        }

        match N::qread(self).await {
            Ok(v) => {
                *t = Some(v);
                *dirty = true;
                Ok(())
            }
            Err(ParsingError::Recoverable) => Ok(()),
            Err(e) => Err(e),
        }
    }

    pub async fn maybe_push<N: Node<N>>(
        &mut self,
        t: &mut Vec<N>,
        dirty: &mut bool,
    ) -> Result<(), ParsingError> {
        if !self.parent_has_child() {
            return Ok(());
        }

        match N::qread(self).await {
            Ok(v) => {
                t.push(v);
                *dirty = true;
                Ok(())
            }
            Err(ParsingError::Recoverable) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Seek forward until `N` parses, skipping unrecognized siblings.
    pub async fn find<N: Node<N>>(&mut self) -> Result<N, ParsingError> {
        self.ensure_parent_has_child()?;

        loop {
            match N::qread(self).await {
                Err(ParsingError::Recoverable) => (),
                otherwise => return otherwise,
            }

            self.skip().await?;
        }
    }

    /// Collect every `N` among the remaining children, skipping the rest.
    pub async fn collect<N: Node<N>>(&mut self) -> Result<Vec<N>, ParsingError> {
        let mut acc = Vec::new();
        if !self.parent_has_child() {
            return Ok(acc);
        }

        loop {
            match N::qread(self).await {
                Err(ParsingError::Recoverable) => match self.peek() {
                    Event::End(_) => return Ok(acc),
                    _ => {
                        self.skip().await?;
                    }
                },
                Ok(v) => acc.push(v),
                Err(e) => return Err(e),
            }
        }
    }

    pub async fn open(&mut self, ns: &[u8], key: &str) -> Result<Event<'static>, ParsingError> {
        let evt = match self.peek() {
            Event::Empty(_) if self.is_tag(ns, key) => {
                // Duplicate the empty element into `prev` so that
                // attribute reads behave as if we had stepped inside it.
                self.prev = self.cur.clone();
                self.cur.clone()
            }
            Event::Start(_) if self.is_tag(ns, key) => self.next().await?,
            _ => return Err(ParsingError::Recoverable),
        };

        self.parents.push(evt.clone());
        Ok(evt)
    }

    pub async fn maybe_open(
        &mut self,
        ns: &[u8],
        key: &str,
    ) -> Result<Option<Event<'static>>, ParsingError> {
        match self.open(ns, key).await {
            Ok(v) => Ok(Some(v)),
            Err(ParsingError::Recoverable) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Attribute of the most recently opened element.
    pub fn prev_attr(&self, attr: &str) -> Option<String> {
        match &self.prev {
            Event::Start(bs) | Event::Empty(bs) => match bs.try_get_attribute(attr) {
                Ok(Some(attr)) => attr
                    .decode_and_unescape_value(&self.rdr)
                    .ok()
                    .map(|v| v.into_owned()),
                _ => None,
            },
            _ => None,
        }
    }

    /// Consume the end tag of the innermost opened element, skipping any
    /// children that were not read.
    pub async fn close(&mut self) -> Result<Event<'static>, ParsingError> {
        // Empty elements have no end tag
        if !self.parent_has_child() {
            self.parents.pop();
            return self.next().await;
        }

        loop {
            match self.peek() {
                Event::End(_) => {
                    self.parents.pop();
                    return self.next().await;
                }
                _ => self.skip().await?,
            };
        }
    }
}
