//! A simulation and an agent talking over a real socket.

use gymbridge::config::BridgeConfig;
use gymbridge::env::{Env, EpisodeStats, NativeValue, RemoteEnv};
use gymbridge::protocol::{FrameCodec, Handshake, SimMessage};
use gymbridge::session::SessionState;
use gymbridge::sim::SimulationEndpoint;
use gymbridge::spaces::{Box as BoxSpace, Dict, Discrete, DynSpace, MultiDiscrete};
use gymbridge::transport::{Channel, TcpAcceptor, TcpChannel};
use gymbridge::BridgeError;
use std::io::Write;
use std::net::TcpStream;
use std::thread;
use std::time::Duration;

fn config() -> BridgeConfig {
    BridgeConfig::default().with_timeout(Some(Duration::from_secs(5)))
}

fn observation_space() -> DynSpace {
    Dict::from_pairs(vec![
        ("position", BoxSpace::uniform(&[2], -10.0, 10.0).unwrap().into()),
        ("lives", Discrete::new(4).unwrap().into()),
    ])
    .unwrap()
    .into()
}

fn observation(t: u64) -> NativeValue {
    NativeValue::dict([
        ("position", NativeValue::vector(vec![t as f64, -(t as f64)])),
        ("lives", NativeValue::Discrete(3 - t.min(3))),
    ])
}

#[test]
fn test_two_episodes_over_tcp() {
    let config = config();
    let acceptor = TcpAcceptor::bind(&config).unwrap();
    let addr = acceptor.local_addr().unwrap();

    let sim_config = config.clone();
    let sim = thread::spawn(move || {
        let channel = TcpChannel::connect(addr, FrameCodec::default()).unwrap();
        let mut sim = SimulationEndpoint::new(channel, &sim_config);
        sim.handshake(observation_space(), MultiDiscrete::new(vec![3, 2]).unwrap().into())
            .unwrap();
        let mut actions = Vec::new();
        for _episode in 0..2 {
            for t in 0..3 {
                let reward = if t == 0 { 0.0 } else { 1.0 };
                actions.push(sim.step(&observation(t), reward, t == 2).unwrap());
            }
        }
        sim.shutdown().unwrap();
        actions
    });

    let env = RemoteEnv::with_connector(acceptor, &config);
    let mut env = EpisodeStats::new(env);
    let (obs, _) = env.reset().unwrap();
    assert_eq!(obs, observation(0));
    assert_eq!(env.observation_space(), Some(&observation_space()));

    let mut returns = Vec::new();
    let mut k = 0u64;
    loop {
        let action = NativeValue::MultiDiscrete(vec![k % 3, k % 2]);
        let r = env.step(&action).unwrap();
        k += 1;
        if r.info.shutdown {
            break;
        }
        if let Some(ret) = r.info.episode_return {
            returns.push(ret);
        }
    }
    assert_eq!(returns, vec![2.0, 2.0]);
    assert_eq!(env.inner().state().unwrap(), SessionState::Terminated);

    let actions = sim.join().unwrap();
    assert_eq!(actions.len(), 6);
    for (k, action) in actions.iter().enumerate() {
        let k = k as u64;
        assert_eq!(*action, NativeValue::MultiDiscrete(vec![k % 3, k % 2]));
    }
}

#[test]
fn test_connect_timeout_without_simulation() {
    let config = BridgeConfig::default().with_timeout(Some(Duration::from_millis(100)));
    let env = RemoteEnv::with_connector(TcpAcceptor::bind(&config).unwrap(), &config);
    assert!(matches!(env.reset(), Err(BridgeError::Timeout(_))));
    assert_eq!(env.state().unwrap(), SessionState::Terminated);
}

#[test]
fn test_simulation_disconnect_after_handshake() {
    let config = config();
    let acceptor = TcpAcceptor::bind(&config).unwrap();
    let addr = acceptor.local_addr().unwrap();

    let sim = thread::spawn(move || {
        let mut channel = TcpChannel::connect(addr, FrameCodec::default()).unwrap();
        let handshake = Handshake::new(
            Discrete::new(2).unwrap().into(),
            Discrete::new(2).unwrap().into(),
        );
        channel.send(&SimMessage::Handshake(handshake).encode()).unwrap();
        channel.recv(Some(Duration::from_secs(5))).unwrap();
    });

    let env = RemoteEnv::with_connector(acceptor, &config);
    assert!(matches!(env.reset(), Err(BridgeError::ChannelClosed)));
    assert!(env.action_space().is_some());
    assert_eq!(env.state().unwrap(), SessionState::Terminated);
    sim.join().unwrap();
}

#[test]
fn test_truncated_frame_over_tcp() {
    let config = config();
    let acceptor = TcpAcceptor::bind(&config).unwrap();
    let addr = acceptor.local_addr().unwrap();

    let sim = thread::spawn(move || {
        let mut stream = TcpStream::connect(addr).unwrap();
        // Header announces 32 bytes, only 3 follow
        stream.write_all(&[0, 0, 0, 32, 1, 2, 3]).unwrap();
        stream.flush().unwrap();
    });

    let env = RemoteEnv::with_connector(acceptor, &config);
    sim.join().unwrap();
    assert!(matches!(env.reset(), Err(BridgeError::Framing(_))));
    assert_eq!(env.state().unwrap(), SessionState::Terminated);
}
