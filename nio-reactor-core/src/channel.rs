use std::fmt::{Debug, Display, Formatter};
use std::io::{Error, ErrorKind};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};

/// Enums used to describe channel state
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ChannelState {
    ///The channel can be used.
    Open,
    ///The channel has been closed and must be cancelled.
    Closed,
}

impl Display for ChannelState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Debug::fmt(self, f)
    }
}

#[derive(Debug)]
enum Socket {
    Listener(TcpListener),
    Stream(TcpStream),
}

/// A listening or connected socket, owned by exactly one reactor at a time.
#[derive(Debug)]
pub struct Channel {
    socket: Socket,
    state: ChannelState,
}

impl From<TcpListener> for Channel {
    fn from(listener: TcpListener) -> Self {
        Channel {
            socket: Socket::Listener(listener),
            state: ChannelState::Open,
        }
    }
}

impl From<TcpStream> for Channel {
    fn from(stream: TcpStream) -> Self {
        Channel {
            socket: Socket::Stream(stream),
            state: ChannelState::Open,
        }
    }
}

impl Channel {
    /// The current state of this channel.
    #[must_use]
    pub fn state(&self) -> ChannelState {
        self.state
    }

    /// Whether this channel can still be used.
    #[must_use]
    pub fn is_open(&self) -> bool {
        ChannelState::Open == self.state
    }

    /// Mark this channel closed. A stream is also shut down in both
    /// directions; the descriptor itself is released on drop.
    pub fn close(&mut self) {
        if ChannelState::Closed == self.state {
            return;
        }
        self.state = ChannelState::Closed;
        if let Socket::Stream(stream) = &self.socket {
            _ = stream.shutdown(Shutdown::Both);
        }
    }

    /// # Errors
    /// if the os refuses to change the mode.
    pub fn set_nonblocking(&self, nonblocking: bool) -> std::io::Result<()> {
        match &self.socket {
            Socket::Listener(listener) => listener.set_nonblocking(nonblocking),
            Socket::Stream(stream) => stream.set_nonblocking(nonblocking),
        }
    }

    /// The listening socket, `None` for a connected channel.
    #[must_use]
    pub fn as_listener(&self) -> Option<&TcpListener> {
        match &self.socket {
            Socket::Listener(listener) => Some(listener),
            Socket::Stream(_) => None,
        }
    }

    /// The connected socket, `None` for a listening channel.
    #[must_use]
    pub fn as_stream(&self) -> Option<&TcpStream> {
        match &self.socket {
            Socket::Listener(_) => None,
            Socket::Stream(stream) => Some(stream),
        }
    }

    /// # Errors
    /// if the socket is not bound.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        match &self.socket {
            Socket::Listener(listener) => listener.local_addr(),
            Socket::Stream(stream) => stream.local_addr(),
        }
    }

    /// # Errors
    /// if this is a listening channel or the stream is not connected.
    pub fn peer_addr(&self) -> std::io::Result<SocketAddr> {
        match &self.socket {
            Socket::Listener(_) => Err(Error::new(
                ErrorKind::InvalidInput,
                "listening channel has no peer",
            )),
            Socket::Stream(stream) => stream.peer_addr(),
        }
    }
}

cfg_if::cfg_if! {
    if #[cfg(windows)] {
        use std::os::windows::io::{AsRawSocket, AsSocket, BorrowedSocket, RawSocket};

        impl AsRawSocket for Channel {
            fn as_raw_socket(&self) -> RawSocket {
                match &self.socket {
                    Socket::Listener(listener) => listener.as_raw_socket(),
                    Socket::Stream(stream) => stream.as_raw_socket(),
                }
            }
        }

        impl AsSocket for Channel {
            fn as_socket(&self) -> BorrowedSocket<'_> {
                match &self.socket {
                    Socket::Listener(listener) => listener.as_socket(),
                    Socket::Stream(stream) => stream.as_socket(),
                }
            }
        }
    } else {
        use std::os::fd::{AsFd, AsRawFd, BorrowedFd, RawFd};

        impl AsRawFd for Channel {
            fn as_raw_fd(&self) -> RawFd {
                match &self.socket {
                    Socket::Listener(listener) => listener.as_raw_fd(),
                    Socket::Stream(stream) => stream.as_raw_fd(),
                }
            }
        }

        impl AsFd for Channel {
            fn as_fd(&self) -> BorrowedFd<'_> {
                match &self.socket {
                    Socket::Listener(listener) => listener.as_fd(),
                    Socket::Stream(stream) => stream.as_fd(),
                }
            }
        }
    }
}
