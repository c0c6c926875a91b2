use super::RepositoryError;

/// Trait for types that can be used as get arguments: a single id yields
/// `Option<D>`, a list of ids yields the documents found, in argument order.
pub trait Gettable<D> {
    type Output;
    fn get_from<R: GetOne<D> + GetMany<D>>(
        &self,
        repo: &R,
    ) -> Result<Self::Output, RepositoryError>;
}

/// Internal trait for getting a single document by business id.
pub trait GetOne<D> {
    fn get_one(&self, id: &str) -> Result<Option<D>, RepositoryError>;
}

/// Internal trait for getting several documents by business id.
pub trait GetMany<D> {
    fn get_many(&self, ids: &[&str]) -> Result<Vec<D>, RepositoryError>;
}

impl<D> Gettable<D> for &str {
    type Output = Option<D>;

    fn get_from<R: GetOne<D> + GetMany<D>>(
        &self,
        repo: &R,
    ) -> Result<Self::Output, RepositoryError> {
        repo.get_one(self)
    }
}

impl<D> Gettable<D> for String {
    type Output = Option<D>;

    fn get_from<R: GetOne<D> + GetMany<D>>(
        &self,
        repo: &R,
    ) -> Result<Self::Output, RepositoryError> {
        repo.get_one(self.as_str())
    }
}

impl<D> Gettable<D> for &String {
    type Output = Option<D>;

    fn get_from<R: GetOne<D> + GetMany<D>>(
        &self,
        repo: &R,
    ) -> Result<Self::Output, RepositoryError> {
        repo.get_one(self.as_str())
    }
}

impl<'a, D> Gettable<D> for &[&'a str] {
    type Output = Vec<D>;

    fn get_from<R: GetOne<D> + GetMany<D>>(
        &self,
        repo: &R,
    ) -> Result<Self::Output, RepositoryError> {
        repo.get_many(self)
    }
}

impl<'a, D, const N: usize> Gettable<D> for [&'a str; N] {
    type Output = Vec<D>;

    fn get_from<R: GetOne<D> + GetMany<D>>(
        &self,
        repo: &R,
    ) -> Result<Self::Output, RepositoryError> {
        repo.get_many(self.as_slice())
    }
}
