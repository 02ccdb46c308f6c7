use std::borrow::Cow;

/// A fully buffered HTTP message body.
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct Body(Cow<'static, [u8]>);

impl Body {
    pub fn empty() -> Self {
        Body(Cow::Borrowed(&[]))
    }

    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0.into_owned()
    }
}

impl From<Vec<u8>> for Body {
    fn from(body: Vec<u8>) -> Self {
        Body(Cow::Owned(body))
    }
}

impl From<&'static [u8]> for Body {
    fn from(body: &'static [u8]) -> Self {
        Body(Cow::Borrowed(body))
    }
}

impl From<&'static str> for Body {
    fn from(body: &'static str) -> Self {
        body.as_bytes().into()
    }
}

impl From<String> for Body {
    fn from(body: String) -> Self {
        body.into_bytes().into()
    }
}

impl From<u64> for Body {
    fn from(count: u64) -> Self {
        count.to_string().into()
    }
}
