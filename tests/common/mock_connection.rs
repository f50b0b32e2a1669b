use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dbm_async_core::database::{ConnectionError, ConnectionFactory, PooledConnection};

/// Driver connection with switchable health
#[derive(Debug)]
pub struct MockConnection {
    pub id: usize,
    pub resource_name: String,
    closed: AtomicBool,
    ready: AtomicBool,
    fail_close: AtomicBool,
    fail_reset: AtomicBool,
    resets: AtomicUsize,
}

impl MockConnection {
    fn new(id: usize, resource_name: &str) -> Self {
        Self {
            id,
            resource_name: resource_name.to_string(),
            closed: AtomicBool::new(false),
            ready: AtomicBool::new(true),
            fail_close: AtomicBool::new(false),
            fail_reset: AtomicBool::new(false),
            resets: AtomicUsize::new(0),
        }
    }

    /// Simulate a connection left inside an aborted transaction
    pub fn leave_in_transaction(&self) {
        self.ready.store(false, Ordering::SeqCst);
    }

    /// Simulate the server dropping the connection
    pub fn drop_from_server(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn fail_on_close(&self) {
        self.fail_close.store(true, Ordering::SeqCst);
    }

    pub fn fail_on_reset(&self) {
        self.fail_reset.store(true, Ordering::SeqCst);
    }

    pub fn resets(&self) -> usize {
        self.resets.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PooledConnection for MockConnection {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    async fn reset(&self) -> Result<(), ConnectionError> {
        if self.fail_reset.load(Ordering::SeqCst) {
            return Err(ConnectionError::new("rollback failed"));
        }
        self.resets.fetch_add(1, Ordering::SeqCst);
        self.ready.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) -> Result<(), ConnectionError> {
        self.closed.store(true, Ordering::SeqCst);
        if self.fail_close.load(Ordering::SeqCst) {
            return Err(ConnectionError::new("close failed"));
        }
        Ok(())
    }
}

/// Factory numbering every connection it opens
#[derive(Debug, Clone, Default)]
pub struct MockFactory {
    opened: Arc<AtomicUsize>,
}

impl MockFactory {
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConnectionFactory<MockConnection> for MockFactory {
    async fn connect(&self, resource_name: &str) -> Result<MockConnection, ConnectionError> {
        let id = self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(MockConnection::new(id, resource_name))
    }
}
