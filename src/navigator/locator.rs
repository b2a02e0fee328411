use crate::path::Segments;

/// Either a path to walk or a handle that was already acquired. Strings and segment sequences
/// convert into [`Locator::Path`], handles are wrapped explicitly with [`Locator::Handle`].
pub enum Locator<H> {
    Path(Segments),
    Handle(H),
}

impl<H> From<Segments> for Locator<H> {
    fn from(path: Segments) -> Self {
        Locator::Path(path)
    }
}

impl<H> From<&Segments> for Locator<H> {
    fn from(path: &Segments) -> Self {
        Locator::Path(path.clone())
    }
}

impl<H> From<&str> for Locator<H> {
    fn from(path: &str) -> Self {
        Locator::Path(Segments::from(path))
    }
}

impl<H> From<String> for Locator<H> {
    fn from(path: String) -> Self {
        Locator::Path(Segments::from(path))
    }
}

impl<H> From<&String> for Locator<H> {
    fn from(path: &String) -> Self {
        Locator::Path(Segments::from(path))
    }
}

impl<H> From<Vec<String>> for Locator<H> {
    fn from(path: Vec<String>) -> Self {
        Locator::Path(Segments::from(path))
    }
}

impl<H> From<Vec<&str>> for Locator<H> {
    fn from(path: Vec<&str>) -> Self {
        Locator::Path(Segments::from(path))
    }
}

impl<H> From<&[&str]> for Locator<H> {
    fn from(path: &[&str]) -> Self {
        Locator::Path(Segments::from(path))
    }
}

impl<H, const N: usize> From<[&str; N]> for Locator<H> {
    fn from(path: [&str; N]) -> Self {
        Locator::Path(Segments::from(path))
    }
}
