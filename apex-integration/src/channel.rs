use derive_more::Constructor;
use std::marker::PhantomData;

/// Transmitter capable of sending items to a receiver without blocking.
pub trait Tx
where
    Self: Clone + Send,
{
    type Item;
    type Error;
    fn send(&self, item: Self::Item) -> Result<(), Self::Error>;
}

#[derive(Debug)]
pub struct UnboundedTx<T, Error> {
    pub tx: tokio::sync::mpsc::UnboundedSender<T>,
    phantom: PhantomData<Error>,
}

impl<T, Error> Clone for UnboundedTx<T, Error> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            phantom: PhantomData,
        }
    }
}

impl<T, Error> UnboundedTx<T, Error> {
    pub fn new(tx: tokio::sync::mpsc::UnboundedSender<T>) -> Self {
        Self {
            tx,
            phantom: PhantomData,
        }
    }
}

impl<T, Error> Tx for UnboundedTx<T, Error>
where
    T: Send,
    Error: From<tokio::sync::mpsc::error::SendError<T>> + Send,
{
    type Item = T;
    type Error = Error;

    fn send(&self, item: Self::Item) -> Result<(), Self::Error> {
        self.tx.send(item).map_err(Error::from)
    }
}

#[derive(Debug, Constructor)]
pub struct UnboundedRx<T> {
    pub rx: tokio::sync::mpsc::UnboundedReceiver<T>,
}

impl<T> UnboundedRx<T> {
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }
}

pub fn mpsc_unbounded<T, Error>() -> (UnboundedTx<T, Error>, UnboundedRx<T>) {
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    (UnboundedTx::new(tx), UnboundedRx::new(rx))
}
