use crate::input::InputManager;
use crate::rendering::Renderer;
use log::{debug, error, info, warn};
use shared::framing::{read_packet, write_packet};
use shared::{Packet, PROTOCOL_VERSION};
use std::io::{self, Write};
use tokio::io::AsyncBufRead;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;

pub struct Client {
    writer: OwnedWriteHalf,
    incoming: mpsc::UnboundedReceiver<io::Result<Packet>>,
    player_id: Option<u32>,
}

impl Client {
    /// Connects and sends the handshake. The reply arrives through `run`.
    pub async fn connect(server_addr: &str, name: &str) -> io::Result<Self> {
        info!("Connecting to {}...", server_addr);
        let stream = TcpStream::connect(server_addr).await?;
        stream.set_nodelay(true)?;
        let (reader, mut writer) = stream.into_split();

        let hello = Packet::Connect {
            client_version: PROTOCOL_VERSION,
            name: name.to_string(),
        };
        write_packet(&mut writer, &hello).await?;

        Ok(Client {
            writer,
            incoming: Self::spawn_receiver(reader),
            player_id: None,
        })
    }

    /// Spawns task that reads packets from the server. Reading happens off
    /// the main loop so a half-read frame is never dropped by `select!`.
    fn spawn_receiver(mut reader: OwnedReadHalf) -> mpsc::UnboundedReceiver<io::Result<Packet>> {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            loop {
                match read_packet(&mut reader).await {
                    Ok(Some(packet)) => {
                        if tx.send(Ok(packet)).is_err() {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        let _ = tx.send(Err(e));
                        break;
                    }
                }
            }
            debug!("Receiver task finished");
        });
        rx
    }

    pub fn player_id(&self) -> Option<u32> {
        self.player_id
    }

    pub async fn send_line(&mut self, line: &str) -> io::Result<()> {
        let packet = Packet::Command {
            line: line.to_string(),
        };
        write_packet(&mut self.writer, &packet).await
    }

    /// Next packet from the server, `Ok(None)` once it closed the connection.
    pub async fn next_packet(&mut self) -> io::Result<Option<Packet>> {
        match self.incoming.recv().await {
            Some(Ok(packet)) => {
                if let Packet::Connected { player_id, .. } = packet {
                    info!("Connected! Player ID: {}", player_id);
                    self.player_id = Some(player_id);
                }
                Ok(Some(packet))
            }
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }

    /// Forwards typed lines and prints server packets until the server ends
    /// the session.
    pub async fn run<R, W>(
        &mut self,
        mut input: InputManager<R>,
        mut renderer: Renderer<W>,
    ) -> io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: Write,
    {
        let mut input_open = true;

        loop {
            tokio::select! {
                packet = self.next_packet() => match packet {
                    Ok(Some(packet)) => {
                        renderer.render(&packet)?;
                        if packet.is_terminal() {
                            break;
                        }
                    }
                    Ok(None) => {
                        warn!("Server closed the connection");
                        break;
                    }
                    Err(e) => {
                        error!("Error receiving packet: {}", e);
                        return Err(e);
                    }
                },

                line = input.next_command(), if input_open => match line? {
                    Some(Ok(line)) => self.send_line(&line).await?,
                    Some(Err(e)) => renderer.line(&format!("! {}", e))?,
                    None => {
                        info!("End of input, leaving the game");
                        input_open = false;
                        write_packet(&mut self.writer, &Packet::Disconnect).await?;
                    }
                },
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;
    use tokio_test::assert_ok;

    #[tokio::test]
    async fn test_handshake_and_commands_reach_server() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let hello = read_packet(&mut stream).await.unwrap().unwrap();
            write_packet(
                &mut stream,
                &Packet::Connected {
                    player_id: 7,
                    symbol: '1',
                    maze: "test".to_string(),
                },
            )
            .await
            .unwrap();
            let command = read_packet(&mut stream).await.unwrap().unwrap();
            let bye = read_packet(&mut stream).await.unwrap().unwrap();
            write_packet(
                &mut stream,
                &Packet::Disconnected {
                    reason: "bye".to_string(),
                },
            )
            .await
            .unwrap();
            (hello, command, bye)
        });

        let mut client = Client::connect(&addr, "ana").await.unwrap();
        let input = InputManager::new(&b"xyz\nN2\n"[..]);
        let renderer = Renderer::new(Vec::new());
        assert_ok!(client.run(input, renderer).await);
        assert_eq!(client.player_id(), Some(7));

        let (hello, command, bye) = server.await.unwrap();
        assert_eq!(
            hello,
            Packet::Connect {
                client_version: PROTOCOL_VERSION,
                name: "ana".to_string()
            }
        );
        // the invalid line never left the client
        assert_eq!(
            command,
            Packet::Command {
                line: "N2".to_string()
            }
        );
        assert_eq!(bye, Packet::Disconnect);
    }
}
