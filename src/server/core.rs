//! The reactor: one thread owning the poller, connection table and timer
//! heap, dispatching readiness events and handing protocol work to the pool.

use crate::config::{ServerConfig, Trigger};
use crate::error::ServerError;
use crate::poller::{Interest, Poller, Ready, Waker};
use crate::pool::ThreadPool;
use crate::server::conn::{Connection, Protocol};
use crate::server::socket;
use crate::timer::TimerHeap;

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Instant;

const BUSY_REPLY: &[u8] = b"server busy\n";

type Factory = Box<dyn FnMut(SocketAddr) -> Box<dyn Protocol> + Send>;
type Table = HashMap<RawFd, Arc<Mutex<Connection>>>;

/// Cloneable handle for stopping a running [`Server`] from another thread.
#[derive(Clone)]
pub struct ServerHandle {
    closing: Arc<AtomicBool>,
    waker: Waker,
}

impl ServerHandle {
    /// Asks the event loop to stop and interrupts its current wait.
    pub fn shutdown(&self) {
        self.closing.store(true, Ordering::Release);
        self.waker.wake();
    }
}

/// Event-driven TCP server core.
///
/// Owns the listening socket, the readiness multiplexer, the idle-timeout
/// heap, the worker pool and the connection table. [`run`](Self::run) blocks
/// on the current thread until a [`ServerHandle::shutdown`].
pub struct Server {
    config: ServerConfig,
    listen_fd: RawFd,
    poller: Poller,
    timer: TimerHeap,
    pool: ThreadPool,
    conns: Table,
    factory: Factory,
    /// Connections whose pool task finished and may need interest flipped.
    /// The only reactor structure other threads touch, via the waker.
    completed: Arc<Mutex<Vec<Weak<Mutex<Connection>>>>>,
    /// Descriptors whose idle deadline fired, staged by timer callbacks.
    expired: Arc<Mutex<Vec<RawFd>>>,
    closing: Arc<AtomicBool>,
}

impl Server {
    /// Binds the listening socket and sets up the reactor.
    ///
    /// `factory` is invoked once per accepted connection to create its
    /// protocol state.
    pub fn new(
        config: ServerConfig,
        factory: impl FnMut(SocketAddr) -> Box<dyn Protocol> + Send + 'static,
    ) -> Result<Self, ServerError> {
        if config.max_connections == 0 {
            return Err(ServerError::Config("max_connections must be nonzero"));
        }
        if config.idle_timeout.is_zero() {
            return Err(ServerError::Config("idle_timeout must be nonzero"));
        }

        // A peer closing mid-write must surface as EPIPE on that connection,
        // not take the whole process down.
        unsafe { libc::signal(libc::SIGPIPE, libc::SIG_IGN) };

        let listen_fd = socket::create_listener(config.port, config.linger)?;
        let poller = Poller::new()?;
        poller.register(
            listen_fd,
            Interest::read().edge(config.listen_trigger == Trigger::Edge),
        )?;

        let pool = ThreadPool::new(config.workers, config.max_queue);

        Ok(Self {
            config,
            listen_fd,
            poller,
            timer: TimerHeap::new(),
            pool,
            conns: HashMap::new(),
            factory: Box::new(factory),
            completed: Arc::new(Mutex::new(Vec::new())),
            expired: Arc::new(Mutex::new(Vec::new())),
            closing: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Handle for shutting the loop down from another thread.
    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            closing: self.closing.clone(),
            waker: self.poller.waker(),
        }
    }

    /// Port the listening socket is bound to.
    pub fn local_port(&self) -> io::Result<u16> {
        socket::local_port(self.listen_fd)
    }

    /// Runs the event loop on the current thread until shutdown.
    ///
    /// Per-connection I/O failures close that connection only; the loop
    /// itself stops only via [`ServerHandle::shutdown`] or a poller failure.
    pub fn run(&mut self) -> Result<(), ServerError> {
        log::info!(
            "listening on port {} ({} workers, idle timeout {:?})",
            self.local_port()?,
            self.pool.worker_count(),
            self.config.idle_timeout
        );

        while !self.closing.load(Ordering::Acquire) {
            // The wait is bounded by the earliest idle deadline so reaping
            // latency never exceeds one timer interval.
            let timeout = self.timer.next_tick();
            self.reap_expired();

            let ready: Vec<Ready> = self.poller.wait(timeout)?.to_vec();

            self.drain_completed();

            for event in ready {
                if event.fd == self.listen_fd {
                    self.deal_listen();
                } else if event.error || event.closed {
                    self.close_conn(event.fd);
                } else if event.readable {
                    self.deal_read(event.fd);
                } else if event.writable {
                    self.deal_write(event.fd);
                }
            }
        }

        self.shutdown_all();
        Ok(())
    }

    /// Accepts until would-block under edge triggering, once under level
    /// triggering.
    fn deal_listen(&mut self) {
        loop {
            match socket::accept(self.listen_fd) {
                Ok((fd, peer)) => self.add_client(fd, peer),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    // EMFILE/ENFILE and friends: log and wait for the next
                    // readiness event rather than spinning.
                    log::error!("accept failed: {e}");
                    break;
                }
            }
            if self.config.listen_trigger == Trigger::Level {
                break;
            }
        }
    }

    fn add_client(&mut self, fd: RawFd, peer: SocketAddr) {
        if self.conns.len() >= self.config.max_connections {
            log::warn!("connection table full ({}), refusing {peer}", self.conns.len());
            socket::refuse(fd, BUSY_REPLY);
            return;
        }

        let edge = self.config.conn_trigger == Trigger::Edge;
        let protocol = (self.factory)(peer);
        let conn = Arc::new(Mutex::new(Connection::new(fd, peer, edge, protocol)));

        let expired = self.expired.clone();
        self.timer.add(fd, self.config.idle_timeout, move |id| {
            expired.lock().unwrap().push(id);
        });

        if let Err(e) = self.poller.register(fd, self.conn_interest(Interest::read())) {
            log::error!("failed to register {fd}: {e}");
            self.timer.remove(fd);
            unsafe { libc::close(fd) };
            return;
        }

        self.conns.insert(fd, conn);
        log::debug!("accepted {peer} as fd {fd} ({} open)", self.conns.len());
    }

    fn deal_read(&mut self, fd: RawFd) {
        let Some(conn) = self.conns.get(&fd).cloned() else {
            return;
        };
        self.timer.adjust(fd, self.config.idle_timeout);

        let result = conn.lock().unwrap().read();
        match result {
            Ok(0) => self.close_conn(fd),
            Ok(_) => self.process(fd, &conn),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                self.rearm(fd, Interest::read());
            }
            Err(e) => {
                log::debug!("read error on fd {fd}: {e}");
                self.close_conn(fd);
            }
        }
    }

    fn deal_write(&mut self, fd: RawFd) {
        let Some(conn) = self.conns.get(&fd).cloned() else {
            return;
        };
        self.timer.adjust(fd, self.config.idle_timeout);

        let result = conn.lock().unwrap().write();
        match result {
            Ok(_) => {
                let (pending, keep_alive) = {
                    let c = conn.lock().unwrap();
                    (c.pending_output(), c.keep_alive())
                };
                if pending {
                    // Partial write: wait for the next writable event, never
                    // spin-retry here.
                    self.rearm(fd, Interest::write());
                } else if keep_alive {
                    // Flushed; pick up any pipelined input, else re-arm read.
                    self.process(fd, &conn);
                } else {
                    self.close_conn(fd);
                }
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                self.rearm(fd, Interest::write());
            }
            Err(e) => {
                log::debug!("write error on fd {fd}: {e}");
                self.close_conn(fd);
            }
        }
    }

    /// Hands the buffered input to the protocol collaborator.
    ///
    /// With workers available the work runs on the pool and reports back
    /// through the completion list; a full queue falls back to inline
    /// processing so work is never silently dropped. With zero workers
    /// everything runs inline.
    fn process(&mut self, fd: RawFd, conn: &Arc<Mutex<Connection>>) {
        if self.pool.worker_count() > 0 {
            let weak = Arc::downgrade(conn);
            let completed = self.completed.clone();
            let waker = self.poller.waker();

            let submitted = self.pool.submit(move || {
                let Some(conn) = weak.upgrade() else {
                    return;
                };
                {
                    let mut c = conn.lock().unwrap();
                    if c.is_closing() {
                        return;
                    }
                    c.process();
                }
                completed.lock().unwrap().push(Arc::downgrade(&conn));
                waker.wake();
            });

            match submitted {
                Ok(()) => return,
                Err(e) => log::warn!("pool rejected task for fd {fd}: {e}; processing inline"),
            }
        }

        let pending = conn.lock().unwrap().process();
        self.flip_interest(fd, pending);
    }

    /// Applies the outcomes of finished pool tasks: flip each connection to
    /// write interest if a response is staged, back to read otherwise.
    fn drain_completed(&mut self) {
        let done: Vec<Weak<Mutex<Connection>>> =
            self.completed.lock().unwrap().drain(..).collect();

        for weak in done {
            let Some(conn) = weak.upgrade() else {
                continue;
            };
            let (fd, pending, closing) = {
                let c = conn.lock().unwrap();
                (c.fd(), c.pending_output(), c.is_closing())
            };
            if closing {
                continue;
            }
            // Guard against descriptor reuse: only act if the table still
            // maps this fd to this very connection.
            match self.conns.get(&fd) {
                Some(current) if Arc::ptr_eq(current, &conn) => {}
                _ => continue,
            }
            self.flip_interest(fd, pending);
        }
    }

    /// Closes every connection whose idle deadline fired.
    fn reap_expired(&mut self) {
        let expired: Vec<RawFd> = self.expired.lock().unwrap().drain(..).collect();
        for fd in expired {
            if self.conns.contains_key(&fd) {
                log::debug!("idle timeout, reaping fd {fd}");
                self.close_conn(fd);
            }
        }
    }

    /// Tears a connection down in the one safe order: mark closing, cancel
    /// the timer node, deregister from the poller, close the descriptor,
    /// erase the table entry.
    fn close_conn(&mut self, fd: RawFd) {
        let Some(conn) = self.conns.get(&fd) else {
            return;
        };
        let peer = {
            let mut c = conn.lock().unwrap();
            c.set_closing();
            c.peer()
        };

        self.timer.remove(fd);
        if let Err(e) = self.poller.remove(fd) {
            log::debug!("deregister fd {fd}: {e}");
        }
        unsafe { libc::close(fd) };
        self.conns.remove(&fd);

        log::debug!("closed {peer} (fd {fd}, {} open)", self.conns.len());
    }

    fn flip_interest(&mut self, fd: RawFd, pending_output: bool) {
        let interest = if pending_output {
            Interest::write()
        } else {
            Interest::read()
        };
        self.rearm(fd, interest);
    }

    fn rearm(&mut self, fd: RawFd, interest: Interest) {
        if let Err(e) = self.poller.modify(fd, self.conn_interest(interest)) {
            log::debug!("re-arm fd {fd}: {e}");
            self.close_conn(fd);
        }
    }

    fn conn_interest(&self, interest: Interest) -> Interest {
        interest
            .edge(self.config.conn_trigger == Trigger::Edge)
            .oneshot(true)
    }

    fn shutdown_all(&mut self) {
        // Fire remaining deadlines deterministically, then close everything.
        self.timer.tick(Instant::now() + self.config.idle_timeout * 2);
        let open: Vec<RawFd> = self.conns.keys().copied().collect();
        for fd in open {
            self.close_conn(fd);
        }
        self.pool.shutdown();
        log::info!("server stopped");
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        let _ = self.poller.remove(self.listen_fd);
        unsafe { libc::close(self.listen_fd) };
    }
}
